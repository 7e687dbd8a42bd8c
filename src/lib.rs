//! Control-flow guided instruction-set sampling for ELF and PE executables.
//!
//! Given a native executable, the sampler finds plausible code entry points
//! (entry point, constructor arrays, symbols, unwind tables), walks the code
//! reachable from them with a bounded worklist, and counts which CPU
//! instruction-set extensions the decoded instructions use. Nothing is
//! executed; the result is a best-effort static estimate.
//!
//! ```no_run
//! use isa_sampler::{analyze_path, Control, SamplerConfig};
//!
//! let report = analyze_path("/bin/ls", &SamplerConfig::default(), &mut Control::default())?;
//! for (feature, count) in report.features_by_count().into_iter().take(5) {
//!     println!("{feature:>12} {count}");
//! }
//! # Ok::<(), isa_sampler::SamplerError>(())
//! ```

pub mod config;
pub mod container;
pub mod error;
pub mod io;
pub mod logging;
pub mod sampler;
pub mod timeout;

pub use config::SamplerConfig;
pub use container::{ContainerFormat, ContainerLayout};
pub use error::{Result, SamplerError};
pub use sampler::{analyze_bytes, analyze_path, sample, Control, Report};
pub use timeout::{analyze_path_with_timeout, CancellationToken, TimeoutConfig};
