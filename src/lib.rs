pub mod params;
pub mod error;
pub mod codec;
pub mod block;
pub mod layout;
pub mod validate;
pub mod select;
pub mod cancel;
pub mod perf;
pub mod io_stream;
pub mod report;
pub mod orchestrator;

pub use params::CodecParams;
pub use error::{EccError, ErrorKind, Result};
pub use codec::{Codec, CodecError, CommandCodec, Decoded, ReedSolomonCodec};
pub use layout::EccLayout;
pub use orchestrator::{EccOptions, Operation, Orchestrator};
pub use report::{BatchReport, FileOutcome, FileReport};
