//! Verify that `SecretBuffer` and `SecretBytes` zero memory after drop.
//!
//! After `SecretSlice<u8>` zeroes its `Box<[u8]>` and deallocates, the
//! allocator may write free-list metadata into the block, so heap checks
//! scan for a sentinel pattern rather than asserting all-zeros.
//!
//! Reading freed memory is undefined behaviour. These are best-effort smoke
//! tests for the debug profile; release builds may elide the reads.

use keyward_crypto_core::envelope;
use keyward_crypto_core::kdf::{derive, Pbkdf2Params};
use keyward_crypto_core::memory::{SecretBuffer, SecretBytes};

const SENTINEL: [u8; 4] = [0xDE, 0xAD, 0xBE, 0xEF];

#[test]
fn secret_buffer_sentinel_not_found_after_drop() {
    let sentinel_data: Vec<u8> = SENTINEL.iter().copied().cycle().take(512).collect();

    let data_ptr: *const u8;
    let data_len: usize;

    {
        let buf = SecretBuffer::new(&sentinel_data).expect("allocation should succeed");
        let exposed = buf.expose();
        data_ptr = exposed.as_ptr();
        data_len = exposed.len();
        assert_eq!(&exposed[..4], &SENTINEL);
    }

    // SAFETY: reads just-freed memory; see module docs.
    let sentinel_found = unsafe {
        let slice = std::slice::from_raw_parts(data_ptr, data_len);
        slice.windows(4).any(|w| w == SENTINEL)
    };

    assert!(
        !sentinel_found,
        "Sentinel pattern found in memory after SecretBuffer drop"
    );
}

#[test]
fn secret_bytes_zeroed_after_drop() {
    let data_ptr: *const u8;

    {
        let key = SecretBytes::<32>::new([0xAB; 32]);
        data_ptr = key.expose().as_ptr();
        assert_eq!(key.expose()[0], 0xAB);
    }

    // SAFETY: inline storage in this stack frame; ZeroizeOnDrop wrote zeros.
    let zeroed = unsafe {
        let slice = std::slice::from_raw_parts(data_ptr, 32);
        slice.iter().all(|&b| b == 0)
    };

    assert!(zeroed, "SecretBytes<32> memory was NOT zeroed after drop");
}

/// A PBKDF2-derived KEK must not outlive its `SecretBytes`.
#[test]
fn kek_fingerprint_not_found_after_drop() {
    let params = Pbkdf2Params { rounds: 1_000 };

    let data_ptr: *const u8;
    let fingerprint: [u8; 8];

    {
        let kek = derive(b"test-password-for-zeroize", &[0x11; 32], &params)
            .expect("KDF derivation should succeed");
        let exposed = kek.expose();
        data_ptr = exposed.as_ptr();
        fingerprint = exposed[..8].try_into().unwrap();
        assert!(exposed.iter().any(|&b| b != 0));
    }

    // SAFETY: see module docs.
    let found = unsafe {
        let slice = std::slice::from_raw_parts(data_ptr, 32);
        slice.windows(8).any(|w| w == fingerprint)
    };

    assert!(!found, "KEK fingerprint found in memory after drop");
}

/// An unwrapped DEK lives in a `SecretBuffer`; its bytes must not survive it.
#[test]
fn unwrapped_dek_sentinel_not_found_after_drop() {
    let master_key = [0x42u8; 32];
    let dek: Vec<u8> = SENTINEL.iter().copied().cycle().take(32).collect();
    let wrapped = envelope::wrap(&master_key, &dek).unwrap();

    let data_ptr: *const u8;
    let data_len: usize;

    {
        let plain = envelope::unwrap(&master_key, &wrapped).unwrap();
        data_ptr = plain.expose().as_ptr();
        data_len = plain.len();
        assert_eq!(plain.expose(), dek.as_slice());
    }

    // SAFETY: see module docs.
    let sentinel_found = unsafe {
        let slice = std::slice::from_raw_parts(data_ptr, data_len);
        slice.windows(4).any(|w| w == SENTINEL)
    };

    assert!(!sentinel_found, "DEK bytes found in memory after drop");
}
