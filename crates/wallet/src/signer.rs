//! Responder side of the signing exchange, backed by the ledger.
//!
//! Each call re-derives the server child share at the requested position;
//! nothing survives between calls.

use std::sync::Arc;

use async_trait::async_trait;
use rand::rngs::OsRng;

use common::{EcdsaR2Request, EcdsaR2Response, EcdsaS2Request, EcdsaS2Response, WalletError};
use protocols::ecdsa::{decode_hash, decode_integer, decode_point, encode_integer, encode_point};
use protocols::SigningParty;

use crate::ledger::Ledger;

/// In-process Responder for one authenticated wallet.
pub struct LedgerSigningParty {
    ledger: Arc<Ledger>,
    uid: String,
    cli_master_pub_key: String,
}

impl LedgerSigningParty {
    pub fn new(ledger: Arc<Ledger>, uid: &str, cli_master_pub_key: &str) -> Self {
        Self {
            ledger,
            uid: uid.to_string(),
            cli_master_pub_key: cli_master_pub_key.to_string(),
        }
    }
}

#[async_trait]
impl SigningParty for LedgerSigningParty {
    async fn nonce_exchange(
        &self,
        request: EcdsaR2Request,
    ) -> Result<EcdsaR2Response, WalletError> {
        self.ledger.authorize(&self.uid, &self.cli_master_pub_key)?;
        let hash = decode_hash(&request.hash)?;
        let r1 = decode_point(&request.r1)?;

        let responder = self.ledger.responder(&self.uid, request.pos)?;
        let (r2, share_r) = responder.respond(&hash, &r1)?;

        tracing::debug!("Wallet {} respond phase at pos {}", self.uid, request.pos);
        Ok(EcdsaR2Response {
            r2: encode_point(&r2),
            share_r: encode_point(&share_r),
        })
    }

    async fn blind_combine(
        &self,
        request: EcdsaS2Request,
    ) -> Result<EcdsaS2Response, WalletError> {
        self.ledger.authorize(&self.uid, &self.cli_master_pub_key)?;
        let hash = decode_hash(&request.hash)?;
        let r1 = decode_point(&request.r1)?;
        let share_r = decode_point(&request.share_r)?;
        let enc_pk1 = decode_integer(&request.enc_pk1)?;
        let enc_pub1 = decode_integer(&request.enc_pub1)?;

        let responder = self.ledger.responder(&self.uid, request.pos)?;
        let s2 = responder.blind_combine(&mut OsRng, &hash, &r1, &share_r, &enc_pk1, enc_pub1)?;

        tracing::debug!("Wallet {} blind-combine phase at pos {}", self.uid, request.pos);
        Ok(EcdsaS2Response {
            s2: encode_integer(&s2),
        })
    }
}
