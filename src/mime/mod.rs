//! MIME reconstruction: classify attachments, rewrite inline image
//! references, pick the multipart structure and serialize it.

pub mod assemble;
pub mod classify;
pub mod content_type;
pub mod html;
pub mod node;

pub use assemble::{render_recipients, MimeAssembler};
pub use node::MimeNode;
