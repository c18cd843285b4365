use crate::B3Digest;
use lazy_static::lazy_static;

pub const HELLO_CONTENTS: &[u8] = b"hello";
pub const WORLD_CONTENTS: &[u8] = b"world";
pub const EMPTY_BLOB_CONTENTS: &[u8] = b"";

lazy_static! {
    pub static ref HELLO_DIGEST: B3Digest = B3Digest::of(HELLO_CONTENTS);
    pub static ref WORLD_DIGEST: B3Digest = B3Digest::of(WORLD_CONTENTS);
    pub static ref EMPTY_BLOB_DIGEST: B3Digest = B3Digest::of(EMPTY_BLOB_CONTENTS);

    // 2 bytes
    pub static ref BLOB_A: bytes::Bytes = vec![0x00, 0x01].into();
    pub static ref BLOB_A_DIGEST: B3Digest = B3Digest::of(&BLOB_A);

    // 1MB
    pub static ref BLOB_B: bytes::Bytes = (0..255).collect::<Vec<u8>>().repeat(4 * 1024).into();
    pub static ref BLOB_B_DIGEST: B3Digest = B3Digest::of(&BLOB_B);

    // 256 KiB of pseudo-random bytes, so content-defined chunking finds
    // several boundaries at small chunk sizes.
    pub static ref BLOB_C: bytes::Bytes = {
        let mut state: u64 = 0x2545_f491_4f6c_dd1d;
        (0..256 * 1024)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 7;
                state ^= state << 17;
                (state >> 24) as u8
            })
            .collect::<Vec<u8>>()
            .into()
    };
}
