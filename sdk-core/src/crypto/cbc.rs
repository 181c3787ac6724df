//! AES-256-CBC with PKCS#7 padding for request bodies
//!
//! CBC carries no authentication tag. A flipped ciphertext bit yields garbage
//! plaintext (or a padding failure), never an authentication error.

use crate::error::{Result, SealpostError};
use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use zeroize::Zeroizing;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// Encrypt with AES-256-CBC
pub fn aes_256_cbc_encrypt(key: &[u8], iv: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
    let cipher = Aes256CbcEnc::new_from_slices(key, iv).map_err(|_| SealpostError::Encryption)?;
    Ok(cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext))
}

/// Decrypt with AES-256-CBC and strip the padding
pub fn aes_256_cbc_decrypt(key: &[u8], iv: &[u8], ciphertext: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
    let cipher = Aes256CbcDec::new_from_slices(key, iv)
        .map_err(|_| SealpostError::Decode("invalid session key"))?;
    cipher
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map(Zeroizing::new)
        .map_err(|_| SealpostError::Decode("decryption failed"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aes_cbc_roundtrip() {
        let key = [0x42u8; 32];
        let iv = [0x07u8; 16];
        let plaintext = br#"{"action":"getTasks"}"#;

        let ct = aes_256_cbc_encrypt(&key, &iv, plaintext).unwrap();
        assert_eq!(ct.len() % 16, 0);
        assert!(ct.len() > plaintext.len());

        let pt = aes_256_cbc_decrypt(&key, &iv, &ct).unwrap();
        assert_eq!(plaintext, pt.as_slice());
    }

    #[test]
    fn test_empty_plaintext_pads_full_block() {
        let ct = aes_256_cbc_encrypt(&[1u8; 32], &[2u8; 16], b"").unwrap();
        assert_eq!(ct.len(), 16);
    }

    #[test]
    fn test_wrong_key_length_rejected() {
        assert_eq!(
            aes_256_cbc_encrypt(&[0u8; 16], &[0u8; 16], b"x"),
            Err(SealpostError::Encryption)
        );
        assert!(matches!(
            aes_256_cbc_decrypt(&[0u8; 32], &[0u8; 8], &[0u8; 16]),
            Err(SealpostError::Decode(_))
        ));
    }

    #[test]
    fn test_truncated_ciphertext_rejected() {
        let ct = aes_256_cbc_encrypt(&[3u8; 32], &[4u8; 16], b"some request body").unwrap();
        let result = aes_256_cbc_decrypt(&[3u8; 32], &[4u8; 16], &ct[..ct.len() - 1]);
        assert!(matches!(result, Err(SealpostError::Decode(_))));
    }
}
