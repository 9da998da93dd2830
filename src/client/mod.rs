//! Client side of the render flow: prepare a photo and send it to a
//! deployed generation endpoint.
//!
//! # Example
//!
//! ```rust,ignore
//! use pergola::client::{prepare_image, ResizeOptions, UploadClient, UploadRequest};
//!
//! let photo = prepare_image(std::fs::read("garden.jpg")?, &ResizeOptions::default())?;
//! let client = UploadClient::new("http://localhost:8080/api/generate");
//! let result = client
//!     .generate(&UploadRequest::new(photo).with_color("anthracite"))
//!     .await?;
//! println!("{}", result.image);
//! ```

mod resize;
mod upload;

pub use resize::{prepare_image, PreparedImage, ResizeOptions};
pub use upload::{UploadClient, UploadRequest, NO_IMAGE_RETURNED};
