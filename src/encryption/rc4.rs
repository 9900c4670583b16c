//! RC4 stream cipher.
//!
//! Used by security handler revisions 2 to 4 (`/V 1`, `/V 2` and `/CFM /V2`
//! crypt filters) and inside the owner/user key computations of
//! algorithms 3, 5 and 7. RC4 is symmetric: the same call encrypts and
//! decrypts.

use crate::error::{Error, Result};

struct Rc4 {
    s: [u8; 256],
    i: u8,
    j: u8,
}

impl Rc4 {
    fn new(key: &[u8]) -> Self {
        let mut s = [0u8; 256];
        for (i, val) in s.iter_mut().enumerate() {
            *val = i as u8;
        }

        let mut j = 0u8;
        for i in 0..256 {
            j = j.wrapping_add(s[i]).wrapping_add(key[i % key.len()]);
            s.swap(i, j as usize);
        }

        Self { s, i: 0, j: 0 }
    }

    fn apply(&mut self, data: &mut [u8]) {
        for byte in data.iter_mut() {
            self.i = self.i.wrapping_add(1);
            self.j = self.j.wrapping_add(self.s[self.i as usize]);
            self.s.swap(self.i as usize, self.j as usize);
            let k = self.s[self.i as usize].wrapping_add(self.s[self.j as usize]);
            *byte ^= self.s[k as usize];
        }
    }
}

/// Apply the RC4 keystream for `key` to `data`.
pub fn rc4(key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    if key.is_empty() || key.len() > 256 {
        return Err(Error::Encryption(format!("invalid RC4 key length {}", key.len())));
    }
    let mut out = data.to_vec();
    Rc4::new(key).apply(&mut out);
    Ok(out)
}

/// RC4 with every key byte XORed with `round`, as used by algorithms 3, 5 and 7.
pub(crate) fn rc4_round(key: &[u8], round: u8, data: &[u8]) -> Result<Vec<u8>> {
    let round_key: Vec<u8> = key.iter().map(|b| b ^ round).collect();
    rc4(&round_key, data)
}
