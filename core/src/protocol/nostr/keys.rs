/*
 * keys.rs
 * Copyright (C) 2026 Chris Burdess
 *
 * This file is part of Ned, a long-form Nostr editor.
 *
 * Ned is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * Ned is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with Ned.  If not, see <http://www.gnu.org/licenses/>.
 */

//! NIP-19 identifiers: npub public keys and naddr addressable-event pointers (bech32 + TLV).

use bech32::{Bech32, Hrp};

use super::types::{Address, KIND_LONG_FORM};
use crate::error::FetchError;

const HRP_PUBLIC_KEY: &str = "npub";
const HRP_ADDRESS: &str = "naddr";

// naddr TLV types
const TLV_SPECIAL: u8 = 0;
const TLV_RELAY: u8 = 1;
const TLV_AUTHOR: u8 = 2;
const TLV_KIND: u8 = 3;

fn invalid(msg: impl Into<String>) -> FetchError {
    FetchError::InvalidAddress(msg.into())
}

pub fn is_valid_hex_key(key: &str) -> bool {
    key.len() == 64 && key.chars().all(|c| c.is_ascii_hexdigit())
}

pub fn is_npub(key: &str) -> bool {
    key.starts_with("npub1")
}

pub fn is_naddr(s: &str) -> bool {
    s.starts_with("naddr1")
}

pub fn hex_to_npub(hex_key: &str) -> Result<String, FetchError> {
    if !is_valid_hex_key(hex_key) {
        return Err(invalid("public key must be 64 hex characters"));
    }
    let bytes = hex_to_bytes(hex_key)?;
    let hrp = Hrp::parse(HRP_PUBLIC_KEY).map_err(|e| invalid(format!("HRP error: {}", e)))?;
    bech32::encode::<Bech32>(hrp, &bytes).map_err(|e| invalid(format!("bech32 encode error: {}", e)))
}

pub fn npub_to_hex(npub: &str) -> Result<String, FetchError> {
    if !is_npub(npub) {
        return Err(invalid("not an npub: must start with 'npub1'"));
    }
    let (hrp, bytes) = bech32::decode(npub).map_err(|e| invalid(format!("invalid bech32: {}", e)))?;
    if hrp.as_str() != HRP_PUBLIC_KEY {
        return Err(invalid(format!("wrong prefix: expected '{}', got '{}'", HRP_PUBLIC_KEY, hrp)));
    }
    if bytes.len() != 32 {
        return Err(invalid(format!("key length: expected 32 bytes, got {}", bytes.len())));
    }
    Ok(bytes_to_hex(&bytes))
}

/// Accept npub or hex and return lowercase hex.
pub fn public_key_to_hex(key: &str) -> Result<String, FetchError> {
    let trimmed = key.trim();
    if is_npub(trimmed) {
        npub_to_hex(trimmed)
    } else if is_valid_hex_key(trimmed) {
        Ok(trimmed.to_lowercase())
    } else {
        Err(invalid("public key must be npub1... or 64-char hex"))
    }
}

impl Address {
    /// Decode an `naddr1...` pointer. Unknown TLV entries are skipped; author and kind are required
    /// and the kind must be long-form.
    pub fn from_naddr(naddr: &str) -> Result<Self, FetchError> {
        let naddr = naddr.trim();
        let naddr = naddr.strip_prefix("nostr:").unwrap_or(naddr);
        if !is_naddr(naddr) {
            return Err(invalid("not an naddr: must start with 'naddr1'"));
        }
        let (hrp, data) = bech32::decode(naddr).map_err(|e| invalid(format!("invalid bech32: {}", e)))?;
        if hrp.as_str() != HRP_ADDRESS {
            return Err(invalid(format!("wrong prefix: expected '{}', got '{}'", HRP_ADDRESS, hrp)));
        }

        let mut identifier: Option<String> = None;
        let mut relays = Vec::new();
        let mut pubkey: Option<String> = None;
        let mut kind: Option<u32> = None;
        let mut rest = data.as_slice();
        while !rest.is_empty() {
            if rest.len() < 2 {
                return Err(invalid("truncated TLV header"));
            }
            let (t, len) = (rest[0], rest[1] as usize);
            if rest.len() < 2 + len {
                return Err(invalid("truncated TLV value"));
            }
            let value = &rest[2..2 + len];
            rest = &rest[2 + len..];
            match t {
                TLV_SPECIAL if identifier.is_none() => {
                    let s = std::str::from_utf8(value).map_err(|_| invalid("identifier is not UTF-8"))?;
                    identifier = Some(s.to_string());
                }
                TLV_RELAY => {
                    if let Ok(url) = std::str::from_utf8(value) {
                        relays.push(url.to_string());
                    }
                }
                TLV_AUTHOR if pubkey.is_none() => {
                    if value.len() != 32 {
                        return Err(invalid(format!("author length: expected 32 bytes, got {}", value.len())));
                    }
                    pubkey = Some(bytes_to_hex(value));
                }
                TLV_KIND if kind.is_none() => {
                    let bytes: [u8; 4] = value
                        .try_into()
                        .map_err(|_| invalid("kind must be 4 bytes"))?;
                    kind = Some(u32::from_be_bytes(bytes));
                }
                _ => {}
            }
        }

        let pubkey = pubkey.ok_or_else(|| invalid("naddr has no author"))?;
        let kind = kind.ok_or_else(|| invalid("naddr has no kind"))?;
        if kind != KIND_LONG_FORM {
            return Err(invalid(format!("unsupported kind {}", kind)));
        }
        Ok(Address {
            kind,
            pubkey,
            identifier: identifier.unwrap_or_default(),
            relays,
        })
    }

    /// Encode as `naddr1...`, including relay hints.
    pub fn to_naddr(&self) -> Result<String, FetchError> {
        let author = hex_to_bytes(&self.pubkey)?;
        if author.len() != 32 {
            return Err(invalid("author must be 32 bytes"));
        }
        let mut data = Vec::new();
        push_tlv(&mut data, TLV_SPECIAL, self.identifier.as_bytes())?;
        for relay in &self.relays {
            push_tlv(&mut data, TLV_RELAY, relay.as_bytes())?;
        }
        push_tlv(&mut data, TLV_AUTHOR, &author)?;
        push_tlv(&mut data, TLV_KIND, &self.kind.to_be_bytes())?;
        let hrp = Hrp::parse(HRP_ADDRESS).map_err(|e| invalid(format!("HRP error: {}", e)))?;
        bech32::encode::<Bech32>(hrp, &data).map_err(|e| invalid(format!("bech32 encode error: {}", e)))
    }
}

fn push_tlv(out: &mut Vec<u8>, t: u8, value: &[u8]) -> Result<(), FetchError> {
    let len = u8::try_from(value.len()).map_err(|_| invalid("TLV value longer than 255 bytes"))?;
    out.push(t);
    out.push(len);
    out.extend_from_slice(value);
    Ok(())
}

pub fn hex_to_bytes(hex: &str) -> Result<Vec<u8>, FetchError> {
    if hex.len() % 2 != 0 {
        return Err(invalid("hex string must have even length"));
    }
    hex.as_bytes()
        .chunks(2)
        .map(|pair| {
            let high = hex_char_val(pair[0]).ok_or_else(|| invalid(format!("invalid hex char: {}", pair[0] as char)))?;
            let low = hex_char_val(pair[1]).ok_or_else(|| invalid(format!("invalid hex char: {}", pair[1] as char)))?;
            Ok((high << 4) | low)
        })
        .collect()
}

pub fn bytes_to_hex(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut s = String::with_capacity(bytes.len() * 2);
    for &b in bytes {
        s.push(HEX[(b >> 4) as usize] as char);
        s.push(HEX[(b & 0x0f) as usize] as char);
    }
    s
}

fn hex_char_val(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PUBKEY: &str = "3bf0c63fcb93463407af97a5e5ee64fa883d107ef9e558472c4eb9aaaefa459d";

    #[test]
    fn npub_roundtrip() {
        let npub = hex_to_npub(PUBKEY).unwrap();
        assert!(npub.starts_with("npub1"));
        assert_eq!(npub_to_hex(&npub).unwrap(), PUBKEY);
        assert_eq!(public_key_to_hex(&npub).unwrap(), PUBKEY);
        assert_eq!(public_key_to_hex(&PUBKEY.to_uppercase()).unwrap(), PUBKEY);
    }

    #[test]
    fn invalid_public_keys() {
        assert!(public_key_to_hex("not_a_key").is_err());
        assert!(npub_to_hex("nsec1abc").is_err());
        assert!(hex_to_bytes("abc").is_err());
        assert!(hex_to_bytes("zz").is_err());
    }

    #[test]
    fn naddr_roundtrip_keeps_relay_hints() {
        let addr = Address {
            kind: KIND_LONG_FORM,
            pubkey: PUBKEY.to_string(),
            identifier: "my-first-post".to_string(),
            relays: vec!["wss://nos.lol".to_string(), "wss://relay.damus.io".to_string()],
        };
        let naddr = addr.to_naddr().unwrap();
        assert!(naddr.starts_with("naddr1"));
        assert_eq!(Address::from_naddr(&naddr).unwrap(), addr);
        assert_eq!(Address::from_naddr(&format!("nostr:{}", naddr)).unwrap(), addr);
    }

    #[test]
    fn naddr_with_empty_identifier() {
        let addr = Address::long_form(PUBKEY, "");
        let decoded = Address::from_naddr(&addr.to_naddr().unwrap()).unwrap();
        assert_eq!(decoded.identifier, "");
        assert!(decoded.relays.is_empty());
    }

    #[test]
    fn naddr_rejects_other_kinds() {
        let mut addr = Address::long_form(PUBKEY, "x");
        addr.kind = 30024;
        let naddr = addr.to_naddr().unwrap();
        assert!(matches!(Address::from_naddr(&naddr), Err(FetchError::InvalidAddress(_))));
    }

    #[test]
    fn naddr_requires_author() {
        let mut data = Vec::new();
        push_tlv(&mut data, TLV_SPECIAL, b"x").unwrap();
        push_tlv(&mut data, TLV_KIND, &KIND_LONG_FORM.to_be_bytes()).unwrap();
        let hrp = Hrp::parse(HRP_ADDRESS).unwrap();
        let naddr = bech32::encode::<Bech32>(hrp, &data).unwrap();
        assert!(Address::from_naddr(&naddr).is_err());
    }

    #[test]
    fn naddr_rejects_npub() {
        let npub = hex_to_npub(PUBKEY).unwrap();
        assert!(Address::from_naddr(&npub).is_err());
    }
}
