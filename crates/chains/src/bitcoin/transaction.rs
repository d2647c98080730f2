//! Bitcoin transaction building.
//!
//! Supports spending from both shared address types:
//! - P2PKH inputs (legacy sighash, signature in `script_sig`)
//! - P2WPKH inputs (BIP-143 sighash, signature in the witness)

use std::str::FromStr;

use bitcoin::blockdata::script::{Builder, Instruction, PushBytesBuf};
use bitcoin::consensus::encode::serialize_hex;
use bitcoin::hashes::Hash;
use bitcoin::secp256k1::{ecdsa, Message, PublicKey, Secp256k1};
use bitcoin::sighash::{EcdsaSighashType, SighashCache};
use bitcoin::transaction::Version;
use bitcoin::{
    absolute, Amount, CompressedPublicKey, Network, OutPoint, ScriptBuf, Sequence, Transaction,
    TxIn, TxOut, Txid, Witness,
};
use serde::{Deserialize, Serialize};

use common::{Utxo, WalletError};

use super::address::parse_address;

/// Outputs at or below this value are not created.
pub const DUST_LIMIT_SATS: u64 = 546;

// ============================================================================
// Transaction Types
// ============================================================================

/// Previous output being spent by one input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpendInput {
    pub txid: String,
    pub vout: u32,
    pub value: u64,
    /// Script pubkey of the input (hex).
    pub script_pubkey: String,
}

impl SpendInput {
    pub fn script(&self) -> Result<ScriptBuf, WalletError> {
        let bytes = hex::decode(&self.script_pubkey)
            .map_err(|e| WalletError::Protocol(format!("Invalid script hex: {}", e)))?;
        Ok(ScriptBuf::from_bytes(bytes))
    }
}

impl From<&Utxo> for SpendInput {
    fn from(utxo: &Utxo) -> Self {
        Self {
            txid: utxo.txid.clone(),
            vout: utxo.vout,
            value: utxo.value,
            script_pubkey: utxo.script_pubkey.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxOutput {
    pub address: String,
    pub value: u64,
    pub is_change: bool,
}

/// An unsigned transaction ready for per-input signing.
#[derive(Debug, Clone)]
pub struct UnsignedTransaction {
    pub tx: Transaction,
    /// Previous outputs, in input order.
    pub inputs: Vec<SpendInput>,
    pub outputs: Vec<TxOutput>,
    pub total_input_sats: u64,
    pub send_amount_sats: u64,
    pub fee_sats: u64,
    pub change_sats: u64,
}

impl UnsignedTransaction {
    /// Sighash of input `index`.
    pub fn sighash(&self, index: usize) -> Result<[u8; 32], WalletError> {
        let input = self.inputs.get(index).ok_or_else(|| {
            WalletError::Protocol(format!("Input {} out of range", index))
        })?;
        input_sighash(&self.tx, index, &input.script()?, input.value)
    }
}

// ============================================================================
// Building
// ============================================================================

/// Build an unsigned transaction spending every utxo in `utxos`.
///
/// Pays `amount_sats` to `to_address` and returns the remainder after
/// `fee_sats` to the first utxo's address, unless it is dust.
pub fn build_unsigned_transaction(
    utxos: &[Utxo],
    to_address: &str,
    amount_sats: u64,
    fee_sats: u64,
    network: Network,
) -> Result<UnsignedTransaction, WalletError> {
    let first = utxos
        .first()
        .ok_or_else(|| WalletError::Protocol("No inputs to spend".to_string()))?;

    let total_input: u64 = utxos.iter().map(|u| u.value).sum();
    let required = amount_sats.saturating_add(fee_sats);
    if total_input < required {
        return Err(WalletError::InsufficientFunds {
            balance: total_input,
            amount: required,
        });
    }
    let change_sats = total_input - required;

    let dest_address = parse_address(to_address, network)?;

    let mut tx_inputs = Vec::with_capacity(utxos.len());
    let mut input_data = Vec::with_capacity(utxos.len());
    for utxo in utxos {
        let txid = Txid::from_str(&utxo.txid)
            .map_err(|e| WalletError::Protocol(format!("Invalid txid: {}", e)))?;

        tx_inputs.push(TxIn {
            previous_output: OutPoint {
                txid,
                vout: utxo.vout,
            },
            script_sig: ScriptBuf::new(),
            sequence: Sequence::ENABLE_RBF_NO_LOCKTIME,
            witness: Witness::default(),
        });
        input_data.push(SpendInput::from(utxo));
    }

    let mut tx_outputs = vec![TxOut {
        value: Amount::from_sat(amount_sats),
        script_pubkey: dest_address.script_pubkey(),
    }];
    let mut output_data = vec![TxOutput {
        address: to_address.to_string(),
        value: amount_sats,
        is_change: false,
    }];

    if change_sats > DUST_LIMIT_SATS {
        let change_addr = parse_address(&first.address, network)?;
        tx_outputs.push(TxOut {
            value: Amount::from_sat(change_sats),
            script_pubkey: change_addr.script_pubkey(),
        });
        output_data.push(TxOutput {
            address: first.address.clone(),
            value: change_sats,
            is_change: true,
        });
    }

    let tx = Transaction {
        version: Version::TWO,
        lock_time: absolute::LockTime::ZERO,
        input: tx_inputs,
        output: tx_outputs,
    };

    tracing::info!(
        "Built unsigned tx with {} inputs, {} outputs, fee: {} sats, change: {} sats",
        input_data.len(),
        output_data.len(),
        fee_sats,
        change_sats
    );

    Ok(UnsignedTransaction {
        tx,
        inputs: input_data,
        outputs: output_data,
        total_input_sats: total_input,
        send_amount_sats: amount_sats,
        fee_sats,
        change_sats,
    })
}

// ============================================================================
// Sighash / Signatures
// ============================================================================

/// Compute the SIGHASH_ALL digest of input `index` spending `script_pubkey`.
pub fn input_sighash(
    tx: &Transaction,
    index: usize,
    script_pubkey: &ScriptBuf,
    value: u64,
) -> Result<[u8; 32], WalletError> {
    let cache = SighashCache::new(tx);

    if script_pubkey.is_p2pkh() {
        let sighash = cache
            .legacy_signature_hash(index, script_pubkey, EcdsaSighashType::All.to_u32())
            .map_err(|e| WalletError::Protocol(format!("Sighash error: {}", e)))?;
        Ok(sighash.to_byte_array())
    } else if script_pubkey.is_p2wpkh() {
        let mut cache = cache;
        let sighash = cache
            .p2wpkh_signature_hash(
                index,
                script_pubkey,
                Amount::from_sat(value),
                EcdsaSighashType::All,
            )
            .map_err(|e| WalletError::Protocol(format!("Sighash error: {}", e)))?;
        Ok(sighash.to_byte_array())
    } else {
        Err(WalletError::Protocol(format!(
            "Unsupported input script: {}",
            script_pubkey.to_hex_string()
        )))
    }
}

/// Place a signature and its public key into input `index`.
pub fn embed_signature(
    tx: &mut Transaction,
    index: usize,
    script_pubkey: &ScriptBuf,
    signature: &ecdsa::Signature,
    pubkey: &CompressedPublicKey,
) -> Result<(), WalletError> {
    let sig = bitcoin::ecdsa::Signature {
        signature: *signature,
        sighash_type: EcdsaSighashType::All,
    };
    let sig_bytes = sig.to_vec();

    let input = tx
        .input
        .get_mut(index)
        .ok_or_else(|| WalletError::Protocol(format!("Input {} out of range", index)))?;

    if script_pubkey.is_p2pkh() {
        let push = PushBytesBuf::try_from(sig_bytes)
            .map_err(|e| WalletError::Protocol(format!("Signature push: {}", e)))?;
        input.script_sig = Builder::new()
            .push_slice(push)
            .push_key(&bitcoin::PublicKey::new(pubkey.0))
            .into_script();
    } else if script_pubkey.is_p2wpkh() {
        let mut witness = Witness::new();
        witness.push(sig_bytes);
        witness.push(pubkey.to_bytes());
        input.witness = witness;
    } else {
        return Err(WalletError::Protocol(
            "Cannot sign unsupported input script".to_string(),
        ));
    }
    Ok(())
}

/// Extract the signature and public key carried by a signed input.
fn input_signature(input: &TxIn, script_pubkey: &ScriptBuf) -> Option<(Vec<u8>, Vec<u8>)> {
    if script_pubkey.is_p2wpkh() {
        let sig = input.witness.nth(0)?.to_vec();
        let key = input.witness.nth(1)?.to_vec();
        return Some((sig, key));
    }

    let mut pushes = input.script_sig.instructions().filter_map(|ins| match ins {
        Ok(Instruction::PushBytes(bytes)) => Some(bytes.as_bytes().to_vec()),
        _ => None,
    });
    let sig = pushes.next()?;
    let key = pushes.next()?;
    Some((sig, key))
}

/// Verify every input of a signed transaction against its previous output.
pub fn verify_transaction(tx: &Transaction, prevouts: &[SpendInput]) -> Result<(), WalletError> {
    if prevouts.len() != tx.input.len() {
        return Err(WalletError::Protocol(format!(
            "Expected {} prevouts, got {}",
            tx.input.len(),
            prevouts.len()
        )));
    }

    let secp = Secp256k1::verification_only();
    for (index, (input, prevout)) in tx.input.iter().zip(prevouts).enumerate() {
        let script = prevout.script()?;
        let (sig_bytes, key_bytes) = input_signature(input, &script).ok_or_else(|| {
            WalletError::SignatureVerification(format!("Input {} is not signed", index))
        })?;

        let sig = bitcoin::ecdsa::Signature::from_slice(&sig_bytes).map_err(|e| {
            WalletError::SignatureVerification(format!("Input {} signature: {}", index, e))
        })?;
        let key = PublicKey::from_slice(&key_bytes).map_err(|e| {
            WalletError::SignatureVerification(format!("Input {} pubkey: {}", index, e))
        })?;

        let compressed = CompressedPublicKey(key);
        let expected = if script.is_p2pkh() {
            ScriptBuf::new_p2pkh(&compressed.pubkey_hash())
        } else {
            ScriptBuf::new_p2wpkh(&compressed.wpubkey_hash())
        };
        if expected != script {
            return Err(WalletError::SignatureVerification(format!(
                "Input {} key does not match its script",
                index
            )));
        }

        let digest = input_sighash(tx, index, &script, prevout.value)?;
        secp.verify_ecdsa(&Message::from_digest(digest), &sig.signature, &key)
            .map_err(|e| {
                WalletError::SignatureVerification(format!("Input {}: {}", index, e))
            })?;
    }

    tracing::debug!("Verified {} inputs of {}", tx.input.len(), tx.compute_txid());
    Ok(())
}

/// Serialize a transaction to raw hex.
pub fn transaction_hex(tx: &Transaction) -> String {
    serialize_hex(tx)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitcoin::address::address_for_key;
    use bitcoin::secp256k1::SecretKey;
    use common::ScriptType;

    const PREV_TXID: &str = "0f8c5cdf448acb82969193452ac4bb7010c0890ceb96fa5e8c332378654459df";

    fn key(byte: u8) -> (SecretKey, CompressedPublicKey) {
        let secp = Secp256k1::new();
        let secret = SecretKey::from_slice(&[byte; 32]).unwrap();
        (secret, CompressedPublicKey(secret.public_key(&secp)))
    }

    fn utxo(pubkey: &CompressedPublicKey, script_type: ScriptType, value: u64, vout: u32) -> Utxo {
        let address = address_for_key(pubkey, Network::Testnet, script_type);
        Utxo {
            pos: 0,
            txid: PREV_TXID.to_string(),
            vout,
            value,
            address: address.to_string(),
            confirmed: true,
            svr_pub_key: String::new(),
            script_pubkey: hex::encode(address.script_pubkey().as_bytes()),
        }
    }

    fn destination() -> String {
        let (_, pubkey) = key(9);
        address_for_key(&pubkey, Network::Testnet, ScriptType::P2wpkh).to_string()
    }

    fn sign_all(unsigned: &mut UnsignedTransaction, secret: &SecretKey, pubkey: &CompressedPublicKey) {
        let secp = Secp256k1::new();
        for index in 0..unsigned.inputs.len() {
            let digest = unsigned.sighash(index).unwrap();
            let sig = secp.sign_ecdsa(&Message::from_digest(digest), secret);
            let script = unsigned.inputs[index].script().unwrap();
            embed_signature(&mut unsigned.tx, index, &script, &sig, pubkey).unwrap();
        }
    }

    #[test]
    fn test_build_with_change() {
        let (_, pubkey) = key(1);
        let utxos = vec![utxo(&pubkey, ScriptType::P2pkh, 93266, 0)];
        let unsigned =
            build_unsigned_transaction(&utxos, &destination(), 50000, 1000, Network::Testnet)
                .unwrap();

        assert_eq!(unsigned.tx.output.len(), 2);
        assert_eq!(unsigned.change_sats, 42266);
        assert!(unsigned.outputs[1].is_change);
        assert_eq!(unsigned.outputs[1].address, utxos[0].address);
        assert_eq!(unsigned.tx.version, Version::TWO);
        assert_eq!(unsigned.tx.input[0].sequence, Sequence::ENABLE_RBF_NO_LOCKTIME);
    }

    #[test]
    fn test_dust_change_is_dropped() {
        let (_, pubkey) = key(1);
        let utxos = vec![utxo(&pubkey, ScriptType::P2wpkh, 10000, 1)];
        let unsigned =
            build_unsigned_transaction(&utxos, &destination(), 9000, 500, Network::Testnet)
                .unwrap();
        assert_eq!(unsigned.tx.output.len(), 1);
        assert_eq!(unsigned.change_sats, 500);
    }

    #[test]
    fn test_insufficient_inputs() {
        let (_, pubkey) = key(1);
        let utxos = vec![utxo(&pubkey, ScriptType::P2pkh, 1000, 0)];
        let err = build_unsigned_transaction(&utxos, &destination(), 900, 200, Network::Testnet)
            .unwrap_err();
        assert!(matches!(err, WalletError::InsufficientFunds { balance: 1000, amount: 1100 }));
    }

    #[test]
    fn test_wrong_network_destination() {
        let (_, pubkey) = key(1);
        let utxos = vec![utxo(&pubkey, ScriptType::P2pkh, 10000, 0)];
        let mainnet = address_for_key(&pubkey, Network::Bitcoin, ScriptType::P2pkh).to_string();
        let err = build_unsigned_transaction(&utxos, &mainnet, 1000, 100, Network::Testnet)
            .unwrap_err();
        assert!(matches!(err, WalletError::InvalidAddress(_)));
    }

    #[test]
    fn test_sign_and_verify_both_script_types() {
        let (secret, pubkey) = key(3);
        let utxos = vec![
            utxo(&pubkey, ScriptType::P2pkh, 60000, 0),
            utxo(&pubkey, ScriptType::P2wpkh, 40000, 1),
        ];
        let mut unsigned =
            build_unsigned_transaction(&utxos, &destination(), 70000, 1000, Network::Testnet)
                .unwrap();
        sign_all(&mut unsigned, &secret, &pubkey);

        assert!(!unsigned.tx.input[0].script_sig.is_empty());
        assert_eq!(unsigned.tx.input[1].witness.len(), 2);
        verify_transaction(&unsigned.tx, &unsigned.inputs).unwrap();
        assert!(!transaction_hex(&unsigned.tx).is_empty());
    }

    #[test]
    fn test_verify_rejects_wrong_key() {
        let (_, owner) = key(3);
        let (other_secret, other_pubkey) = key(4);
        let utxos = vec![utxo(&owner, ScriptType::P2wpkh, 40000, 1)];
        let mut unsigned =
            build_unsigned_transaction(&utxos, &destination(), 30000, 1000, Network::Testnet)
                .unwrap();
        sign_all(&mut unsigned, &other_secret, &other_pubkey);

        let err = verify_transaction(&unsigned.tx, &unsigned.inputs).unwrap_err();
        assert!(matches!(err, WalletError::SignatureVerification(_)));
    }

    #[test]
    fn test_verify_rejects_unsigned() {
        let (_, pubkey) = key(3);
        let utxos = vec![utxo(&pubkey, ScriptType::P2pkh, 40000, 0)];
        let unsigned =
            build_unsigned_transaction(&utxos, &destination(), 30000, 1000, Network::Testnet)
                .unwrap();
        assert!(verify_transaction(&unsigned.tx, &unsigned.inputs).is_err());
    }
}
