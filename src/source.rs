//! エンジンが利用する外部コラボレータの契約と、入力ファイルを元にした静的実装

use std::collections::HashMap;
use std::str::FromStr;

use bitcoin::{OutPoint, Txid};

use crate::config::{FeeRateDef, InputConfig};
use crate::error::SourceError;
use crate::transaction::validate_price;
use crate::types::{CandidateTransaction, UnspentOutput};

/// 承認数フィルタ済みのUTXOを返す
pub trait UtxoSource {
    fn fetch_unspent(&self, address: &str) -> Result<Vec<UnspentOutput>, SourceError>;
}

pub trait FeeRateSource {
    /// sat/byte
    fn fetch_rate(&self, confirmation_target: u32) -> Result<u64, SourceError>;
}

pub trait PriceSource {
    /// 1 BTC あたりの USD
    fn fetch_price(&self) -> Result<f64, SourceError>;
}

/// 署名済み入力の断片。中身は署名者に依存する
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedInput(pub Vec<u8>);

#[derive(Debug, Clone, PartialEq)]
pub struct SignedTransaction {
    pub candidate: CandidateTransaction,
    pub inputs: Vec<SignedInput>,
}

pub trait Signer {
    fn sign(
        &self,
        candidate: &CandidateTransaction,
        input_index: usize,
        private_key: &str,
    ) -> Result<SignedInput, SourceError>;
}

pub trait Broadcaster {
    fn broadcast(&self, signed: &SignedTransaction) -> Result<Txid, SourceError>;
}

/// 入力ファイルの内容をそのまま返すソース
#[derive(Debug, Clone)]
pub struct StaticLedger {
    utxos: HashMap<String, Vec<LedgerUtxo>>,
    fee_rates: Vec<FeeRateDef>,
    btc_price_usd: f64,
    min_confirmations: u32,
}

#[derive(Debug, Clone)]
struct LedgerUtxo {
    output: UnspentOutput,
    confirmations: u32,
}

impl StaticLedger {
    pub fn from_config(config: &InputConfig) -> Result<Self, SourceError> {
        let mut utxos: HashMap<String, Vec<LedgerUtxo>> = HashMap::new();
        for entry in &config.wallet {
            let list = utxos.entry(entry.address.clone()).or_default();
            for def in &entry.utxos {
                let txid = Txid::from_str(&def.txid).map_err(|e| {
                    SourceError::Malformed(format!("無効なTXID形式 ({}): {}", def.txid, e))
                })?;
                list.push(LedgerUtxo {
                    output: UnspentOutput {
                        output_ref: OutPoint::new(txid, def.vout),
                        owning_address: entry.address.clone(),
                        value: def.value_sats,
                    },
                    confirmations: def.confirmations,
                });
            }
        }
        Ok(StaticLedger {
            utxos,
            fee_rates: config.fee_rates.clone(),
            btc_price_usd: config.btc_price_usd,
            min_confirmations: config.min_confirmations,
        })
    }
}

impl UtxoSource for StaticLedger {
    fn fetch_unspent(&self, address: &str) -> Result<Vec<UnspentOutput>, SourceError> {
        let Some(list) = self.utxos.get(address) else {
            return Ok(Vec::new());
        };
        let mut result = Vec::with_capacity(list.len());
        for u in list {
            if u.confirmations < self.min_confirmations {
                log::debug!(
                    "UTXO {} (アドレス {}) は承認数 {} のため無視します",
                    u.output.output_ref,
                    address,
                    u.confirmations
                );
                continue;
            }
            result.push(u.output.clone());
        }
        Ok(result)
    }
}

impl FeeRateSource for StaticLedger {
    /// 目標ブロック数以内で承認される最も安い手数料率
    fn fetch_rate(&self, confirmation_target: u32) -> Result<u64, SourceError> {
        self.fee_rates
            .iter()
            .filter(|r| r.confirmation_target <= confirmation_target)
            .map(|r| r.rate)
            .min()
            .ok_or_else(|| {
                SourceError::Unavailable(format!(
                    "{} ブロック以内の手数料率が設定されていません",
                    confirmation_target
                ))
            })
    }
}

impl PriceSource for StaticLedger {
    fn fetch_price(&self) -> Result<f64, SourceError> {
        validate_price(self.btc_price_usd)
    }
}
