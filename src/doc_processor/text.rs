use super::ExtractionError;

/// Plain-text reports are taken verbatim.
pub fn decode(bytes: Vec<u8>) -> Result<String, ExtractionError> {
    Ok(String::from_utf8(bytes)?)
}
