//! Perceptual change detection.
//!
//! A [`Fingerprint`] is a DCT perceptual hash of a frame: the image is
//! reduced, transformed to the frequency domain, and thresholded into a
//! fixed-length bit pattern. Visually similar frames differ in few bits, so
//! the Hamming distance between consecutive fingerprints gates whether the
//! expensive analysis step runs at all.

use std::fmt::{Display, Formatter};

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine as _;
use image_hasher::{HashAlg, HasherConfig};
use serde::{Deserialize, Serialize};

use crate::{AppError, Result};

/// Default side length of the hash grid (64-bit fingerprints).
pub const DEFAULT_HASH_SIZE: u32 = 8;

/// Default distance that must be strictly exceeded to count as a change.
pub const DEFAULT_THRESHOLD: u32 = 5;

/// Base64 engine tolerant of missing padding, which some firmware builds omit.
const PAYLOAD_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Fixed-length perceptual hash, canonically rendered as lowercase hex.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Fingerprint {
    bytes: Vec<u8>,
}

impl Fingerprint {
    /// Wrap raw hash bytes.
    #[must_use]
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// Parse a hex rendering (either case).
    ///
    /// # Errors
    ///
    /// Returns `AppError::Decode` if `hex` is empty or not valid hex.
    pub fn from_hex(hex: &str) -> Result<Self> {
        if hex.is_empty() {
            return Err(AppError::Decode("empty fingerprint".into()));
        }
        hex::decode(hex)
            .map(Self::from_bytes)
            .map_err(|err| AppError::Decode(format!("invalid fingerprint {hex:?}: {err}")))
    }

    /// Canonical lowercase hex rendering.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(&self.bytes)
    }

    /// Number of bits in the pattern.
    #[must_use]
    pub fn bit_len(&self) -> u32 {
        u32::try_from(self.bytes.len() * 8).unwrap_or(u32::MAX)
    }

    /// Bitwise complement; useful as a maximally distant reference.
    #[must_use]
    pub fn complement(&self) -> Self {
        Self::from_bytes(self.bytes.iter().map(|b| !b).collect())
    }

    /// Hamming distance to `other`, or `None` when the lengths differ.
    #[must_use]
    pub fn distance(&self, other: &Self) -> Option<u32> {
        if self.bytes.len() != other.bytes.len() {
            return None;
        }
        Some(
            self.bytes
                .iter()
                .zip(&other.bytes)
                .map(|(a, b)| (a ^ b).count_ones())
                .sum(),
        )
    }
}

impl Display for Fingerprint {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl TryFrom<String> for Fingerprint {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self> {
        Self::from_hex(&value)
    }
}

impl From<Fingerprint> for String {
    fn from(value: Fingerprint) -> Self {
        value.to_hex()
    }
}

/// One decoded frame ready for comparison and analysis.
#[derive(Debug, Clone)]
pub struct ImagePayload {
    /// Base64 payload as received from the device.
    pub base64: String,
    /// Decoded image bytes (JPEG in practice).
    pub bytes: Vec<u8>,
    /// Perceptual fingerprint of the decoded image.
    pub fingerprint: Fingerprint,
}

impl ImagePayload {
    /// Decode a base64 payload and fingerprint the resulting image.
    ///
    /// CPU-bound; async callers should run it on a blocking thread.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Decode` if the payload is not base64 or the bytes
    /// are not a decodable image.
    pub fn decode(base64: String, hash_size: u32) -> Result<Self> {
        let bytes = decode_base64(&base64)?;
        let fingerprint = compute_fingerprint(&bytes, hash_size)?;
        Ok(Self {
            base64,
            bytes,
            fingerprint,
        })
    }
}

/// Decode a base64 payload into raw bytes.
///
/// # Errors
///
/// Returns `AppError::Decode` on invalid base64.
pub fn decode_base64(payload: &str) -> Result<Vec<u8>> {
    PAYLOAD_ENGINE
        .decode(payload.trim())
        .map_err(|err| AppError::Decode(format!("invalid base64 payload: {err}")))
}

/// Compute the DCT perceptual hash of an encoded image.
///
/// # Errors
///
/// Returns `AppError::Decode` if `image_bytes` is not a supported image.
pub fn compute_fingerprint(image_bytes: &[u8], hash_size: u32) -> Result<Fingerprint> {
    let img = image::load_from_memory(image_bytes)
        .map_err(|err| AppError::Decode(format!("invalid image data: {err}")))?;
    let hasher = HasherConfig::new()
        .hash_alg(HashAlg::Mean)
        .hash_size(hash_size, hash_size)
        .preproc_dct()
        .to_hasher();

    let hash = hasher.hash_image(&img);
    Ok(Fingerprint::from_bytes(hash.as_bytes().to_vec()))
}

/// Decide whether `current` differs meaningfully from `previous`.
///
/// - No previous fingerprint (first capture): always different.
/// - Otherwise different iff the Hamming distance strictly exceeds
///   `threshold`. Fingerprints of unequal length are incomparable and count
///   as different.
#[must_use]
pub fn is_different(current: &Fingerprint, previous: Option<&Fingerprint>, threshold: u32) -> bool {
    let Some(previous) = previous else {
        return true;
    };
    current
        .distance(previous)
        .map_or(true, |distance| distance > threshold)
}
