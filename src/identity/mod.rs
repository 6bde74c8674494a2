//! Physical display identity
//!
//! - `decode` - zero-trimmed buffer decoding and UID extraction
//! - `resolver` - logical id to hardware UID correlation
//! - `rebind` - moving preset entries to reassigned logical ids

mod decode;
mod rebind;
mod resolver;

pub use decode::{decode_buffer, extract_uid};
pub use rebind::{rebind_entries, RebindResult, Remap};
pub use resolver::{resolve, IdentityMap};
