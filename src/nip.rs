//! NIP-13 proof-of-work and NIP-26 delegation checks.

use anyhow::{anyhow, bail, Context, Result};
use secp256k1::{schnorr::Signature, Message, Secp256k1, XOnlyPublicKey};
use sha2::{Digest, Sha256};

use crate::event::Event;

/// Number of leading zero bits in a hex-encoded digest. Stops at the
/// first non-hex character.
pub fn count_leading_zero_bits(hex_str: &str) -> u32 {
    let mut count = 0;
    for c in hex_str.chars() {
        let Some(val) = c.to_digit(16) else {
            return count;
        };
        if val == 0 {
            count += 4;
        } else {
            // Zero bits within the leading nibble of a 4-bit value.
            count += val.leading_zeros() - 28;
            break;
        }
    }
    count
}

/// Check that an event carries valid proof-of-work of at least
/// `min_difficulty`: the `nonce` tag must claim at least that much and
/// the id must back the claim.
pub fn is_pow_valid(event: &Event, min_difficulty: u32) -> bool {
    if min_difficulty == 0 {
        return true;
    }
    let Some(nonce) = event.find_last_tag("nonce") else {
        return false;
    };
    if nonce.0.len() < 3 {
        return false;
    }
    let Ok(claimed) = nonce.0[2].trim().parse::<u32>() else {
        return false;
    };
    if claimed < min_difficulty {
        return false;
    }
    count_leading_zero_bits(&event.id) >= claimed
}

/// Validate the event's `delegation` tag per NIP-26 and return the
/// delegator pubkey on success.
///
/// The tag is `["delegation", <delegator>, <conditions>, <sig>]`; the
/// conditions string is a URL query whose recognised keys are `kind`
/// (repeatable), `created_at>` and `created_at<`.
pub fn validate_delegation(event: &Event) -> Result<String> {
    let tag = event
        .find_tag("delegation")
        .ok_or_else(|| anyhow!("event has no delegation tag"))?;
    if tag.0.len() != 4 {
        bail!("tag is not a valid delegation tag");
    }
    let delegator = &tag.0[1];
    let conditions = &tag.0[2];
    let sig_hex = &tag.0[3];

    check_delegation_conditions(event, conditions)
        .context("event does not satisfy conditions")?;
    verify_delegation_signature(&event.pubkey, delegator, conditions, sig_hex)
        .context("signature verification failed")?;

    Ok(delegator.clone())
}

fn check_delegation_conditions(event: &Event, conditions: &str) -> Result<()> {
    // A literal '+' would decode as a space; escape it first.
    let safe = conditions.replace('+', "%2B");

    let mut allowed_kinds: Vec<u32> = Vec::new();
    for (key, value) in url::form_urlencoded::parse(safe.as_bytes()) {
        match key.as_ref() {
            "kind" => {
                let kind: u32 = value
                    .parse()
                    .map_err(|_| anyhow!("invalid 'kind' condition value: {value:?}"))?;
                allowed_kinds.push(kind);
            }
            "created_at>" => {
                let ts: i64 = value
                    .parse()
                    .map_err(|_| anyhow!("invalid 'created_at>' value: {value:?}"))?;
                if event.created_at <= ts {
                    bail!("event created_at {} is not after {ts}", event.created_at);
                }
            }
            "created_at<" => {
                let ts: i64 = value
                    .parse()
                    .map_err(|_| anyhow!("invalid 'created_at<' value: {value:?}"))?;
                if event.created_at >= ts {
                    bail!("event created_at {} is not before {ts}", event.created_at);
                }
            }
            _ => {}
        }
    }
    if !allowed_kinds.is_empty() && !allowed_kinds.contains(&event.kind) {
        bail!("event kind {} is not in the allowed list", event.kind);
    }
    Ok(())
}

fn verify_delegation_signature(
    delegatee: &str,
    delegator: &str,
    conditions: &str,
    sig_hex: &str,
) -> Result<()> {
    let token = format!("nostr:delegation:{delegatee}:{conditions}");
    let hash = Sha256::digest(token.as_bytes());

    let sig = Signature::from_slice(&hex::decode(sig_hex).context("signature is not valid hex")?)?;
    let pk = XOnlyPublicKey::from_slice(
        &hex::decode(delegator).context("delegator pubkey is not valid hex")?,
    )?;
    let secp = Secp256k1::verification_only();
    let msg = Message::from_digest_slice(&hash)?;
    secp.verify_schnorr(&sig, &msg, &pk)
        .map_err(|e| anyhow!("schnorr signature is invalid: {e}"))
}
