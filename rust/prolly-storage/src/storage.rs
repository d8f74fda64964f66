use prolly_common::HashAlgorithm;

mod backend;
pub use backend::*;

mod cache;
pub use cache::*;

mod measure;
pub use measure::*;

mod content_addressed;
pub use content_addressed::*;

/// A universal envelope for all compatible combinations of [Encoder] and
/// [StorageBackend] implementations. See the crate documentation for
/// a practical example of usage.
///
/// [Encoder]: crate::Encoder
#[derive(Clone)]
pub struct Storage<Encoder, Backend>
where
    Encoder: crate::Encoder,
    Backend: StorageBackend,
{
    /// The [Encoder](crate::Encoder) used by the [Storage]
    pub encoder: Encoder,
    /// The [StorageBackend] used by the [Storage]
    pub backend: Backend,
    /// The [HashAlgorithm] that derives block addresses
    pub hash_algorithm: HashAlgorithm,
    /// Whether bytes read from the backend are re-hashed and checked against
    /// the address they were requested by
    pub verify_reads: bool,
}

impl<Encoder, Backend> Storage<Encoder, Backend>
where
    Encoder: crate::Encoder,
    Backend: StorageBackend,
{
    /// Combine an encoder and a backend, addressing blocks with BLAKE3
    pub fn new(encoder: Encoder, backend: Backend) -> Self {
        Self {
            encoder,
            backend,
            hash_algorithm: HashAlgorithm::default(),
            verify_reads: false,
        }
    }

    /// Address blocks with the given [HashAlgorithm] instead
    pub fn with_hash_algorithm(mut self, hash_algorithm: HashAlgorithm) -> Self {
        self.hash_algorithm = hash_algorithm;
        self
    }

    /// Re-hash every block read from the backend, failing reads whose bytes
    /// do not match their address
    pub fn with_verified_reads(mut self) -> Self {
        self.verify_reads = true;
        self
    }
}
