mod download;
mod info;
mod status;
mod upload;

pub use self::download::{Download, Target};
pub use self::info::{write_json, Info};
pub use self::status::Status;
pub use self::upload::Upload;
