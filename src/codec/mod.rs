//! Codec module - little-endian field primitives for message payloads.
//!
//! Every typed message in the catalog is a fixed byte layout built from
//! these primitives:
//!
//! - [`FieldCodec`] - offset-based reads and masked writes (u16/u32/i16, strings)
//! - [`PayloadWriter`] - append-only builder used when serializing payloads
//!
//! # Design
//!
//! Like the rest of the crate, the codec is a marker struct with static
//! methods. Reads are fallible (`BufferTooShort`), writes are total: values
//! wider than the target field are masked, and strings are truncated at the
//! byte boundary and NUL-padded.
//!
//! # Example
//!
//! ```
//! use tandem_sim::codec::{FieldCodec, PayloadWriter};
//!
//! let payload = PayloadWriter::with_capacity(6)
//!     .u16(0x1234)
//!     .u32(1_234_567_890)
//!     .finish();
//!
//! assert_eq!(FieldCodec::read_u16(&payload, 0).unwrap(), 0x1234);
//! assert_eq!(FieldCodec::read_u32(&payload, 2).unwrap(), 1_234_567_890);
//! ```

mod fields;

pub use fields::{FieldCodec, PayloadWriter};
