use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::AppError;
use crate::fee::SizeModel;

/// 手数料率の上限 (sat/byte)
pub const DEFAULT_MAX_FEE_RATE: u64 = 100;
/// 指定がない場合の手数料率 (sat/byte)
pub const DEFAULT_FEE_PER_BYTE: u64 = 30;
pub const DEFAULT_MIN_FEE_USD: f64 = 0.01;
pub const DEFAULT_MAX_FEE_USD: f64 = 5.00;
pub const DEFAULT_MIN_CONFIRMATIONS: u32 = 1;

/// おつりを捨てるかどうかの閾値計算に使う手数料率
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum ChangeThresholdRate {
    /// `reference_fee_rate` を使う
    #[default]
    Reference,
    /// リクエストの手数料率を使う
    Request,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    pub size_model: SizeModel,
    pub max_fee_rate: u64,
    pub reference_fee_rate: u64,
    pub min_fee_usd: f64,
    pub max_fee_usd: f64,
    pub change_threshold_rate: ChangeThresholdRate,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            size_model: SizeModel::default(),
            max_fee_rate: DEFAULT_MAX_FEE_RATE,
            reference_fee_rate: DEFAULT_FEE_PER_BYTE,
            min_fee_usd: DEFAULT_MIN_FEE_USD,
            max_fee_usd: DEFAULT_MAX_FEE_USD,
            change_threshold_rate: ChangeThresholdRate::default(),
        }
    }
}

impl EngineConfig {
    /// おつり閾値に使う手数料率
    pub fn threshold_rate(&self, request_rate: u64) -> u64 {
        match self.change_threshold_rate {
            ChangeThresholdRate::Reference => self.reference_fee_rate,
            ChangeThresholdRate::Request => request_rate,
        }
    }
}

/// CLIの入力ファイル
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct InputConfig {
    pub btc_price_usd: f64,
    #[serde(default = "default_min_confirmations")]
    pub min_confirmations: u32,
    #[serde(default)]
    pub fee_rates: Vec<FeeRateDef>,
    pub wallet: Vec<WalletEntry>,
    #[serde(default)]
    pub engine: EngineConfig,
}

impl InputConfig {
    pub fn load(path: &Path) -> Result<Self, AppError> {
        let content = fs::read_to_string(path).map_err(|e| {
            log::error!("入力ファイルの読み込みに失敗しました: {:?}", path);
            AppError::Io(e)
        })?;
        let config: InputConfig = serde_json::from_str(&content).map_err(|e| {
            log::error!("入力JSONのパースに失敗しました。");
            AppError::JsonParse {
                file_path: path.to_path_buf(),
                source: e,
            }
        })?;
        log::debug!("入力設定ファイルのパース成功: {} アドレス", config.wallet.len());
        Ok(config)
    }
}

fn default_min_confirmations() -> u32 {
    DEFAULT_MIN_CONFIRMATIONS
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct FeeRateDef {
    pub confirmation_target: u32,
    pub rate: u64,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct WalletEntry {
    pub name: String,
    pub address: String,
    /// 監視専用アドレスは秘密鍵を持たない
    #[serde(default)]
    pub privkey: Option<String>,
    #[serde(default)]
    pub utxos: Vec<UtxoDef>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct UtxoDef {
    pub txid: String,
    pub vout: u32,
    pub value_sats: u64,
    pub confirmations: u32,
}
