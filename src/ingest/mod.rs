/// Pass directory ingestion
///
/// This module handles everything that reads the decoder's output:
/// - Deciding whether a pass has finished being written (stability.rs)
/// - Picking the parser for a pass directory (classify.rs)
/// - Turning a pass directory into catalog records (parsers.rs)
/// - Display labels for composite names (composite.rs)

pub mod classify;
pub mod composite;
pub mod parsers;
pub mod stability;
