//! Synthetic encoder shared by the daemon's tests.

use facematch_core::{EncodeError, Embedding, FaceEncoder};
use std::time::Duration;

/// Treats image bytes as comma-separated embedding values.
///
/// `noface` has no face, `corrupt` fails to decode, and a `slow:` prefix
/// stalls the worker before answering.
pub struct TextEncoder;

impl FaceEncoder for TextEncoder {
    fn encode(&mut self, image: &[u8]) -> Result<Option<Embedding>, EncodeError> {
        let text = std::str::from_utf8(image).map_err(|e| EncodeError::Other(e.to_string()))?;
        let text = match text.trim().strip_prefix("slow:") {
            Some(rest) => {
                std::thread::sleep(Duration::from_millis(300));
                rest
            }
            None => text.trim(),
        };
        match text {
            "noface" => Ok(None),
            "corrupt" => Err(EncodeError::Other("corrupt image".into())),
            values => values
                .split(',')
                .map(|v| v.trim().parse::<f32>())
                .collect::<Result<Vec<_>, _>>()
                .map(|values| Some(Embedding::new(values)))
                .map_err(|e| EncodeError::Other(e.to_string())),
        }
    }
}
