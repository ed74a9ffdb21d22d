//! Fragment custody
//!
//! Shares are stored sealed with ChaCha20-Poly1305 under an engine-held key.
//! Each fragment gets a fresh random nonce and is bound to its vault and
//! fragment id through the associated data, so a sealed fragment copied into
//! another row fails to open.
//!
//! Fragments are opened one id at a time and only for renewal, extension or
//! reconstruction; plaintext shares never leave this module.

use crate::codec::{self, Share};
use crate::store::Transaction;
use crate::types::FragmentRecord;
use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;
use vigil_core::{FragmentId, PartyId, Scheme, VaultId, VigilError, VigilResult};
use zeroize::Zeroizing;

/// Length of a sealing key in bytes.
pub const SEALING_KEY_LEN: usize = 32;

const NONCE_LEN: usize = 12;

/// Symmetric key protecting fragments at rest.
#[derive(Clone)]
pub struct SealingKey(Zeroizing<[u8; SEALING_KEY_LEN]>);

impl SealingKey {
    /// Fresh random key.
    pub fn generate() -> Self {
        let mut bytes = Zeroizing::new([0u8; SEALING_KEY_LEN]);
        OsRng.fill_bytes(&mut bytes[..]);
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; SEALING_KEY_LEN]) -> Self {
        Self(Zeroizing::new(bytes))
    }

    /// Parse a 64-character hex key.
    pub fn from_hex(encoded: &str) -> VigilResult<Self> {
        let decoded = Zeroizing::new(
            hex::decode(encoded.trim())
                .map_err(|_| VigilError::invalid("Sealing key is not valid hex"))?,
        );
        if decoded.len() != SEALING_KEY_LEN {
            return Err(VigilError::invalid(format!(
                "Sealing key must be {SEALING_KEY_LEN} bytes"
            )));
        }
        let mut bytes = Zeroizing::new([0u8; SEALING_KEY_LEN]);
        bytes.copy_from_slice(&decoded);
        Ok(Self(bytes))
    }
}

impl std::fmt::Debug for SealingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SealingKey(..)")
    }
}

/// Seals, issues, revokes and combines the fragments of every vault.
pub struct FragmentVault {
    cipher: ChaCha20Poly1305,
}

impl std::fmt::Debug for FragmentVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FragmentVault").finish_non_exhaustive()
    }
}

fn associated_data(vault_id: VaultId, fragment_id: FragmentId) -> [u8; 32] {
    let mut aad = [0u8; 32];
    aad[..16].copy_from_slice(vault_id.as_bytes());
    aad[16..].copy_from_slice(fragment_id.as_bytes());
    aad
}

impl FragmentVault {
    pub fn new(key: &SealingKey) -> Self {
        Self {
            cipher: ChaCha20Poly1305::new(Key::from_slice(&key.0[..])),
        }
    }

    // =========================================================================
    // SEALING
    // =========================================================================

    fn seal(
        &self,
        vault_id: VaultId,
        id: FragmentId,
        share: &Share,
        assigned_to: Option<PartyId>,
    ) -> VigilResult<FragmentRecord> {
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);
        let plaintext = share.to_bytes();
        let aad = associated_data(vault_id, id);
        let sealed = self
            .cipher
            .encrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: &plaintext[..],
                    aad: &aad[..],
                },
            )
            .map_err(|_| VigilError::internal("Fragment sealing failed"))?;
        Ok(FragmentRecord {
            id,
            vault_id,
            index: share.index(),
            nonce,
            sealed,
            checksum: hex::encode(share.checksum()),
            split_id: hex::encode(share.split_id()),
            assigned_to,
        })
    }

    fn open(&self, record: &FragmentRecord) -> VigilResult<Share> {
        let aad = associated_data(record.vault_id, record.id);
        let plaintext = Zeroizing::new(
            self.cipher
                .decrypt(
                    Nonce::from_slice(&record.nonce),
                    Payload {
                        msg: &record.sealed[..],
                        aad: &aad[..],
                    },
                )
                .map_err(|_| VigilError::InvalidFragmentSet)?,
        );
        Ok(Share::from_bytes(&plaintext)?)
    }

    /// Load and open the listed fragments, each by its own id.
    fn load(&self, tx: &Transaction<'_>, ids: &[FragmentId]) -> VigilResult<Vec<Share>> {
        ids.iter()
            .map(|id| {
                let record = tx.fragment(*id)?;
                self.open(record)
            })
            .collect()
    }

    // =========================================================================
    // LIFECYCLE
    // =========================================================================

    /// Split `secret` and store the `N` fragments unassigned.
    pub fn seal_initial(
        &self,
        tx: &mut Transaction<'_>,
        vault_id: VaultId,
        secret: &[u8],
        scheme: Scheme,
    ) -> VigilResult<usize> {
        let shares = codec::split(secret, scheme, &mut OsRng)?;
        for share in &shares {
            let record = self.seal(vault_id, FragmentId::new(), share, None)?;
            tx.upsert_fragment(record);
        }
        Ok(shares.len())
    }

    /// Hand a fragment to a newly active guardian.
    ///
    /// The lowest unassigned fragment is used when there is one; otherwise the
    /// split is extended to the smallest unused index.
    pub fn assign(
        &self,
        tx: &mut Transaction<'_>,
        vault_id: VaultId,
        party_id: PartyId,
        scheme: Scheme,
    ) -> VigilResult<(FragmentId, u8)> {
        let mut slots = tx.fragment_slots(vault_id);
        slots.sort_by_key(|(_, index, _)| *index);

        if let Some((id, index, _)) = slots.iter().find(|(_, _, holder)| holder.is_none()) {
            let mut record = tx.fragment(*id)?.clone();
            record.assigned_to = Some(party_id);
            tx.upsert_fragment(record);
            return Ok((*id, *index));
        }

        let index = (1..=scheme.max_index())
            .find(|candidate| slots.iter().all(|(_, index, _)| index != candidate))
            .ok_or(VigilError::GuardianCapExceeded {
                maximum: scheme.max_guardians(),
            })?;
        let basis: Vec<FragmentId> = slots
            .iter()
            .take(usize::from(scheme.threshold()))
            .map(|(id, _, _)| *id)
            .collect();
        let shares = self.load(tx, &basis)?;
        let share = codec::extend(&shares, scheme, index)?;
        let id = FragmentId::new();
        let record = self.seal(vault_id, id, &share, Some(party_id))?;
        tx.upsert_fragment(record);
        tracing::debug!(%vault_id, index, "split extended for new guardian");
        Ok((id, index))
    }

    /// Destroy a fragment and renew the rest of the lineage.
    ///
    /// Returns the revoked index and how many fragments remain.
    pub fn revoke(
        &self,
        tx: &mut Transaction<'_>,
        vault_id: VaultId,
        fragment_id: FragmentId,
        scheme: Scheme,
    ) -> VigilResult<(u8, usize)> {
        let revoked = tx
            .remove_fragment(fragment_id)
            .ok_or_else(|| VigilError::not_found(format!("Fragment {fragment_id}")))?;

        let slots = tx.fragment_slots(vault_id);
        if slots.is_empty() {
            return Ok((revoked.index, 0));
        }
        let ids: Vec<FragmentId> = slots.iter().map(|(id, _, _)| *id).collect();
        let shares = self.load(tx, &ids)?;
        let renewed = codec::renew(&shares, scheme, &mut OsRng)?;
        for ((id, _, holder), share) in slots.iter().zip(&renewed) {
            let record = self.seal(vault_id, *id, share, *holder)?;
            tx.upsert_fragment(record);
        }
        Ok((revoked.index, renewed.len()))
    }

    /// Combine the given fragments into the secret.
    pub fn reconstruct(
        &self,
        tx: &Transaction<'_>,
        fragment_ids: &[FragmentId],
        scheme: Scheme,
    ) -> VigilResult<Zeroizing<Vec<u8>>> {
        if fragment_ids.len() < usize::from(scheme.threshold()) {
            return Err(VigilError::InvalidFragmentSet);
        }
        let shares = self.load(tx, fragment_ids)?;
        Ok(codec::reconstruct(&shares, scheme)?)
    }
}
