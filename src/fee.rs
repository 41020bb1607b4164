use serde::Deserialize;

use crate::error::EngineError;
use crate::source::FeeRateSource;

pub const MIN_CONFIRMATION_TARGET: u32 = 1;
pub const MAX_CONFIRMATION_TARGET: u32 = 24;

/// トランザクションのバイト長の線形モデル
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct SizeModel {
    /// version・locktime・入出力数などの固定部分
    pub base_overhead: u64,
    /// 署名済み入力1つ (非圧縮公開鍵のP2PKHを想定)
    pub per_input: u64,
    pub per_output: u64,
}

impl Default for SizeModel {
    fn default() -> Self {
        SizeModel {
            base_overhead: 10,
            per_input: 180,
            per_output: 34,
        }
    }
}

impl SizeModel {
    pub fn estimated_size(&self, num_inputs: usize, num_outputs: usize) -> u64 {
        self.base_overhead
            + self.per_input * num_inputs as u64
            + self.per_output * num_outputs as u64
    }
}

/// バイト長と手数料率から手数料 (sats) を求める
pub fn estimate_fee(tx_byte_length: u64, rate_per_byte: u64) -> Result<u64, EngineError> {
    tx_byte_length.checked_mul(rate_per_byte).ok_or_else(|| {
        EngineError::InvalidRequest(format!(
            "手数料の計算がオーバーフローしました: {} bytes x {} sat/byte",
            tx_byte_length, rate_per_byte
        ))
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeRateEnvelope {
    pub confirmation_target: u32,
    pub rate: u64,
}

impl FeeRateEnvelope {
    pub fn new(confirmation_target: u32, rate: u64) -> Result<Self, EngineError> {
        validate_target(confirmation_target)?;
        Ok(FeeRateEnvelope {
            confirmation_target,
            rate,
        })
    }
}

fn validate_target(target: u32) -> Result<(), EngineError> {
    if !(MIN_CONFIRMATION_TARGET..=MAX_CONFIRMATION_TARGET).contains(&target) {
        return Err(EngineError::InvalidRequest(format!(
            "ブロック目標は {} から {} の整数で指定してください: {}",
            MIN_CONFIRMATION_TARGET, MAX_CONFIRMATION_TARGET, target
        )));
    }
    Ok(())
}

/// 手数料率ソースから目標ブロック数に対応する手数料率を取得する
pub fn resolve_fee_rate<S: FeeRateSource + ?Sized>(
    source: &S,
    confirmation_target: u32,
) -> Result<FeeRateEnvelope, EngineError> {
    validate_target(confirmation_target)?;
    let rate = source
        .fetch_rate(confirmation_target)
        .map_err(|e| EngineError::UpstreamFetch {
            resource: format!("手数料率 ({} ブロック)", confirmation_target),
            source: e,
        })?;
    log::debug!(
        "{} ブロック以内の承認に対する手数料率: {} sat/byte",
        confirmation_target,
        rate
    );
    FeeRateEnvelope::new(confirmation_target, rate)
}
