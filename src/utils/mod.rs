pub mod atomic;
pub mod net;
pub mod sanitize;
pub mod validation;

pub use atomic::{remove_if_exists, write_replace};
pub use net::local_ip;
pub use sanitize::escape_html;
pub use validation::{validate_entry_name, validate_port, validate_text_filename};
