//! vproute: video processing engine router
//!
//! Decides which fixed-function or programmable engine runs each requested
//! video processing feature, and how many submissions a frame needs.
//!
//! # Engines
//!
//! - **VEBOX**: video pre-processor (denoise, deinterlace, color enhancement, tone mapping)
//! - **SFC**: scaler/format converter fed by VEBOX (scaling, color conversion, rotation)
//! - **Render**: programmable compute (composition and everything the others cannot do)
//!
//! # Example
//!
//! ```rust,no_run
//! use vproute::{CapsPreset, Format, HwCaps, Request, Resolver, SessionContext, Surface};
//!
//! fn main() -> vproute::Result<()> {
//!     let resolver = Resolver::new(HwCaps::from(CapsPreset::Reference));
//!     let request = Request::single(
//!         Surface::new(Format::Nv12, 1920, 1080),
//!         Surface::new(Format::Argb8, 1280, 720),
//!     );
//!
//!     let mut session = SessionContext::new();
//!     for submission in resolver.resolve_frame(&request, &mut session)? {
//!         println!("{}: {}", submission.engines, submission.executed.describe());
//!     }
//!     Ok(())
//! }
//! ```

pub mod caps;
pub mod config;
pub mod error;
pub mod feature;
pub mod pipe;
pub mod resolver;
pub mod stream;
pub mod types;

// Re-exports for convenience
pub use caps::{CapsPreset, HwCaps};
pub use config::ResolverConfig;
pub use error::{Error, Result};
pub use pipe::{Pipe, Request};
pub use resolver::{Plan, Resolver, SessionContext, SharedSession, Submission};
pub use stream::{FrameResult, FrameStream};
pub use types::{Format, Surface};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
