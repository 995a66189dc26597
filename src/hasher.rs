use std::hash::{Hash, Hasher};

use crate::models::ImageSpec;

pub trait DigestHasher {
    fn input<I: Hash>(&mut self, input: I);
}

impl DigestHasher for blake3::Hasher {
    fn input<I: Hash>(&mut self, input: I) {
        struct StdHasher<'a>(&'a mut blake3::Hasher);

        impl<'a> Hasher for StdHasher<'a> {
            fn finish(&self) -> u64 {
                unreachable!("digest hashers are finalized through blake3")
            }

            fn write(&mut self, bytes: &[u8]) {
                self.0.update(bytes);
            }
        }

        input.hash(&mut StdHasher(self))
    }
}

/// Content hash stored as an image label, used to tell a current image from
/// a stale one with the same tag.
pub fn image_hash(spec: &ImageSpec) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.input(spec);
    hasher.finalize().to_hex().to_string()
}
