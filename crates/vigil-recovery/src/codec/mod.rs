//! Threshold fragment codec (Shamir secret sharing over GF(256)).
//!
//! Each secret byte gets its own random polynomial of degree `K - 1` whose
//! constant term is the byte; share `i` holds the evaluations at `x = i`.
//!
//! Every share of one split carries the same random split id and a BLAKE3
//! checksum binding `(index, threshold, split id, data)`. Validation walks the
//! whole presented set before deciding, and every failure collapses into
//! [`FragmentError::InvalidFragmentSet`] so callers cannot learn which share
//! was at fault.
//!
//! Besides `split`/`reconstruct` the codec offers:
//! - [`renew`]: proactive refresh; adds a zero-constant polynomial to every
//!   share and rotates the split id so revoked shares stop combining.
//! - [`extend`]: mints a share for a new index from `K` existing shares.

mod field;

use field::Gf256;
use rand::{CryptoRng, RngCore};
use subtle::{Choice, ConstantTimeEq};
use vigil_core::{Scheme, VigilError};
use zeroize::Zeroizing;

const CHECKSUM_CONTEXT: &str = "vigil 2024 fragment checksum v1";
const ENCODING_VERSION: u8 = 1;
const HEADER_LEN: usize = 1 + 1 + 1 + SPLIT_ID_LEN + CHECKSUM_LEN;

/// Length of the per-split random identifier.
pub const SPLIT_ID_LEN: usize = 16;
/// Length of a share checksum.
pub const CHECKSUM_LEN: usize = 32;

/// Codec failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FragmentError {
    /// Split parameters or the secret itself are unusable
    #[error("Invalid split parameters: {0}")]
    InvalidParameters(String),

    /// The presented fragments cannot reconstruct a secret
    #[error("Invalid fragment set")]
    InvalidFragmentSet,
}

impl From<FragmentError> for VigilError {
    fn from(err: FragmentError) -> Self {
        match err {
            FragmentError::InvalidParameters(message) => VigilError::invalid(message),
            FragmentError::InvalidFragmentSet => VigilError::InvalidFragmentSet,
        }
    }
}

/// One fragment of a split secret.
#[derive(Clone)]
pub struct Share {
    index: u8,
    threshold: u8,
    split_id: [u8; SPLIT_ID_LEN],
    data: Zeroizing<Vec<u8>>,
    checksum: [u8; CHECKSUM_LEN],
}

impl std::fmt::Debug for Share {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Share")
            .field("index", &self.index)
            .field("threshold", &self.threshold)
            .field("split_id", &hex::encode(self.split_id))
            .field("len", &self.data.len())
            .finish_non_exhaustive()
    }
}

impl Share {
    fn seal(index: u8, threshold: u8, split_id: [u8; SPLIT_ID_LEN], data: Vec<u8>) -> Self {
        let data = Zeroizing::new(data);
        let checksum = checksum(index, threshold, &split_id, &data);
        Self {
            index,
            threshold,
            split_id,
            data,
            checksum,
        }
    }

    /// Evaluation point (`1..=255`).
    pub fn index(&self) -> u8 {
        self.index
    }

    /// Threshold the share was produced for.
    pub fn threshold(&self) -> u8 {
        self.threshold
    }

    /// Identifier shared by every share of one split lineage.
    pub fn split_id(&self) -> &[u8; SPLIT_ID_LEN] {
        &self.split_id
    }

    /// Checksum embedded at split time.
    pub fn checksum(&self) -> &[u8; CHECKSUM_LEN] {
        &self.checksum
    }

    fn is_intact(&self) -> Choice {
        let expected = checksum(self.index, self.threshold, &self.split_id, &self.data);
        self.checksum[..].ct_eq(&expected[..])
    }

    /// Serialize into the opaque byte layout stored inside sealed fragments.
    pub fn to_bytes(&self) -> Zeroizing<Vec<u8>> {
        let mut out = Zeroizing::new(Vec::with_capacity(HEADER_LEN + self.data.len()));
        out.push(ENCODING_VERSION);
        out.push(self.index);
        out.push(self.threshold);
        out.extend_from_slice(&self.split_id);
        out.extend_from_slice(&self.checksum);
        out.extend_from_slice(&self.data);
        out
    }

    /// Parse the layout written by [`Share::to_bytes`].
    ///
    /// Only the framing is checked here; integrity is verified when the share
    /// takes part in a reconstruction.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, FragmentError> {
        if bytes.len() <= HEADER_LEN || bytes[0] != ENCODING_VERSION {
            return Err(FragmentError::InvalidFragmentSet);
        }
        let mut split_id = [0u8; SPLIT_ID_LEN];
        split_id.copy_from_slice(&bytes[3..3 + SPLIT_ID_LEN]);
        let mut checksum = [0u8; CHECKSUM_LEN];
        checksum.copy_from_slice(&bytes[3 + SPLIT_ID_LEN..HEADER_LEN]);
        Ok(Self {
            index: bytes[1],
            threshold: bytes[2],
            split_id,
            data: Zeroizing::new(bytes[HEADER_LEN..].to_vec()),
            checksum,
        })
    }

    #[cfg(test)]
    pub(crate) fn data_mut(&mut self) -> &mut Vec<u8> {
        &mut self.data
    }
}

fn checksum(index: u8, threshold: u8, split_id: &[u8; SPLIT_ID_LEN], data: &[u8]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new_derive_key(CHECKSUM_CONTEXT);
    hasher.update(&[index, threshold]);
    hasher.update(split_id);
    hasher.update(&(data.len() as u64).to_le_bytes());
    hasher.update(data);
    *hasher.finalize().as_bytes()
}

fn fresh_split_id<R: RngCore + CryptoRng>(rng: &mut R) -> [u8; SPLIT_ID_LEN] {
    let mut split_id = [0u8; SPLIT_ID_LEN];
    rng.fill_bytes(&mut split_id);
    split_id
}

/// Split `secret` into `scheme.distribution()` shares, any `scheme.threshold()`
/// of which reconstruct it.
pub fn split<R: RngCore + CryptoRng>(
    secret: &[u8],
    scheme: Scheme,
    rng: &mut R,
) -> Result<Vec<Share>, FragmentError> {
    if secret.is_empty() {
        return Err(FragmentError::InvalidParameters(
            "Secret must not be empty".to_string(),
        ));
    }

    let threshold = usize::from(scheme.threshold());
    let split_id = fresh_split_id(rng);
    let mut outputs: Vec<Vec<u8>> = (0..scheme.distribution())
        .map(|_| Vec::with_capacity(secret.len()))
        .collect();

    let mut randomness = Zeroizing::new(vec![0u8; threshold - 1]);
    let mut coefficients = Zeroizing::new(vec![Gf256::ZERO; threshold]);
    for &byte in secret {
        rng.fill_bytes(&mut randomness);
        coefficients[0] = Gf256::new(byte);
        for (slot, &r) in coefficients[1..].iter_mut().zip(randomness.iter()) {
            *slot = Gf256::new(r);
        }
        for (position, output) in outputs.iter_mut().enumerate() {
            let x = Gf256::new(position as u8 + 1);
            output.push(field::evaluate(&coefficients, x).value());
        }
    }

    Ok(outputs
        .into_iter()
        .enumerate()
        .map(|(position, data)| Share::seal(position as u8 + 1, scheme.threshold(), split_id, data))
        .collect())
}

/// Validate a presented set and pick the distinct-index shares in order.
///
/// Every share is inspected before the verdict so the outcome does not depend
/// on where in the set a bad share sits.
fn select<'a>(shares: &'a [Share], scheme: Scheme) -> Result<Vec<&'a Share>, FragmentError> {
    let reference = shares.first().ok_or(FragmentError::InvalidFragmentSet)?;
    let mut valid = Choice::from(1u8);
    let mut selected: Vec<&Share> = Vec::with_capacity(shares.len());

    for share in shares {
        valid &= share.is_intact();
        valid &= share.split_id[..].ct_eq(&reference.split_id[..]);
        valid &= Choice::from(u8::from(share.threshold == scheme.threshold()));
        valid &= Choice::from(u8::from(
            share.index != 0 && share.index <= scheme.max_index(),
        ));
        valid &= Choice::from(u8::from(share.data.len() == reference.data.len()));

        match selected.iter().position(|s| s.index == share.index) {
            Some(at) => valid &= selected[at].data[..].ct_eq(&share.data[..]),
            None => selected.push(share),
        }
    }

    if bool::from(valid) {
        Ok(selected)
    } else {
        Err(FragmentError::InvalidFragmentSet)
    }
}

/// Reconstruct the secret from at least `scheme.threshold()` shares.
///
/// The first `K` distinct indices are used; any `K` correct shares of the
/// same split give the same result.
pub fn reconstruct(shares: &[Share], scheme: Scheme) -> Result<Zeroizing<Vec<u8>>, FragmentError> {
    let threshold = usize::from(scheme.threshold());
    if shares.len() < threshold {
        return Err(FragmentError::InvalidFragmentSet);
    }
    let selected = select(shares, scheme)?;
    if selected.len() < threshold {
        return Err(FragmentError::InvalidFragmentSet);
    }
    let selected = &selected[..threshold];

    let len = selected[0].data.len();
    let mut secret = Zeroizing::new(Vec::with_capacity(len));
    let mut points = vec![(Gf256::ZERO, Gf256::ZERO); threshold];
    for position in 0..len {
        for (point, share) in points.iter_mut().zip(selected) {
            *point = (Gf256::new(share.index), Gf256::new(share.data[position]));
        }
        let value =
            field::interpolate(&points, Gf256::ZERO).ok_or(FragmentError::InvalidFragmentSet)?;
        secret.push(value.value());
    }
    points.iter_mut().for_each(|p| *p = (Gf256::ZERO, Gf256::ZERO));
    Ok(secret)
}

/// Refresh every share without reconstructing the secret.
///
/// All shares of the lineage that should stay valid must be passed together;
/// shares left out keep the old split id and no longer combine with the
/// renewed ones.
pub fn renew<R: RngCore + CryptoRng>(
    shares: &[Share],
    scheme: Scheme,
    rng: &mut R,
) -> Result<Vec<Share>, FragmentError> {
    let selected = select(shares, scheme)?;
    let threshold = usize::from(scheme.threshold());
    let split_id = fresh_split_id(rng);
    let len = selected[0].data.len();

    let mut renewed: Vec<Vec<u8>> = selected.iter().map(|s| s.data.to_vec()).collect();
    let mut randomness = Zeroizing::new(vec![0u8; threshold - 1]);
    let mut coefficients = Zeroizing::new(vec![Gf256::ZERO; threshold]);
    for position in 0..len {
        rng.fill_bytes(&mut randomness);
        for (slot, &r) in coefficients[1..].iter_mut().zip(randomness.iter()) {
            *slot = Gf256::new(r);
        }
        for (data, share) in renewed.iter_mut().zip(&selected) {
            let delta = field::evaluate(&coefficients, Gf256::new(share.index));
            data[position] = (Gf256::new(data[position]) + delta).value();
        }
    }

    Ok(selected
        .iter()
        .zip(renewed)
        .map(|(share, data)| Share::seal(share.index, share.threshold, split_id, data))
        .collect())
}

/// Mint a share for `index` that combines with the presented lineage.
pub fn extend(shares: &[Share], scheme: Scheme, index: u8) -> Result<Share, FragmentError> {
    if index == 0 || index > scheme.max_index() {
        return Err(FragmentError::InvalidParameters(format!(
            "Fragment index {index} outside 1..={}",
            scheme.max_index()
        )));
    }
    let threshold = usize::from(scheme.threshold());
    let selected = select(shares, scheme)?;
    if selected.iter().any(|s| s.index == index) {
        return Err(FragmentError::InvalidParameters(format!(
            "Fragment index {index} already issued"
        )));
    }
    if selected.len() < threshold {
        return Err(FragmentError::InvalidFragmentSet);
    }
    let selected = &selected[..threshold];

    let len = selected[0].data.len();
    let x = Gf256::new(index);
    let mut data = Vec::with_capacity(len);
    let mut points = vec![(Gf256::ZERO, Gf256::ZERO); threshold];
    for position in 0..len {
        for (point, share) in points.iter_mut().zip(selected) {
            *point = (Gf256::new(share.index), Gf256::new(share.data[position]));
        }
        data.push(
            field::interpolate(&points, x)
                .ok_or(FragmentError::InvalidFragmentSet)?
                .value(),
        );
    }
    points.iter_mut().for_each(|p| *p = (Gf256::ZERO, Gf256::ZERO));

    Ok(Share::seal(index, scheme.threshold(), selected[0].split_id, data))
}
