//! Text helpers shared by the normalizers and the CLI.
//!
//! - **HTML**: tag stripping, plain-text extraction and image URL recovery
//!   for feed content
//! - **Terminal text**: control-character stripping and width-aware
//!   truncation for printing feed text

mod html;
mod text;

pub use html::{
    clean_excerpt, decode_entities, first_img_src, html_to_text, strip_tags, strip_wp_size_suffix,
};
pub use text::{strip_control_chars, truncate_to_width};
