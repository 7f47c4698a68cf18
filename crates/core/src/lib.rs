pub mod fingerprint;
pub mod media;
pub mod naming;
pub mod recipient;
#[cfg(test)]
mod testutils;

pub use fingerprint::{digest_file, FileDigest};
pub use media::{sniff_bytes, sniff_file, MediaKind, Sniffed};
pub use naming::{resolve, split_name, ResolveError};
pub use recipient::{extract_recipient, recipient_or_unknown, UNKNOWN_RECIPIENT};
