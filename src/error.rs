use std::path::PathBuf;
use thiserror::Error;

/// 外部コラボレータ (UTXO取得・手数料率・価格・署名・ブロードキャスト) のエラー
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SourceError {
    #[error("データ取得不可: {0}")]
    Unavailable(String),

    #[error("不正な応答: {0}")]
    Malformed(String),

    #[error("拒否されました: {0}")]
    Rejected(String),
}

/// 資金不足の内訳
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shortfall {
    /// 送金額そのものに届かない
    Principal,
    /// 送金額は足りるが手数料を加えると足りない
    AfterFees,
}

impl std::fmt::Display for Shortfall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Shortfall::Principal => write!(f, "元本不足"),
            Shortfall::AfterFees => write!(f, "手数料加算後に不足"),
        }
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("送金リクエストが不正です: {0}")]
    InvalidRequest(String),

    #[error("資金不足 ({kind}): 利用可能な総額 {available} sats, 要求額 {required} sats (手数料 {fee} sats を含む)")]
    InsufficientFunds {
        required: u64,
        available: u64,
        fee: u64,
        kind: Shortfall,
    },

    #[error("出力合計 {outputs} sats が入力合計 {inputs} sats を超えています")]
    NegativeFee { inputs: u64, outputs: u64 },

    #[error("手数料が小さすぎます: {fee_sats} sats (${fee_usd:.6} < ${minimum_usd:.2})")]
    FeeTooSmall {
        fee_sats: u64,
        fee_usd: f64,
        minimum_usd: f64,
    },

    #[error("手数料が大きすぎます: {fee_sats} sats (${fee_usd:.2} > ${maximum_usd:.2})")]
    FeeTooLarge {
        fee_sats: u64,
        fee_usd: f64,
        maximum_usd: f64,
    },

    #[error("上流データの取得に失敗しました ({resource}): {source}")]
    UpstreamFetch {
        resource: String,
        #[source]
        source: SourceError,
    },

    #[error("アドレス {address} の秘密鍵が見つかりません")]
    MissingKey { address: String },

    #[error("署名エラー (入力インデックス {input_index}): {source}")]
    Signing {
        input_index: usize,
        #[source]
        source: SourceError,
    },

    #[error("ブロードキャストに失敗しました: {0}")]
    Broadcast(#[source] SourceError),
}

/// CLI側のエラー
#[derive(Debug, Error)]
pub enum AppError {
    #[error("I/Oエラー: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSONパースエラー ファイル: {file_path:?}, 詳細: {source}")]
    JsonParse {
        file_path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("JSONシリアライズエラー: {0}")]
    JsonWrite(#[source] serde_json::Error),

    #[error("入力検証エラー: {0}")]
    InputValidation(String),

    #[error("\"{0}\" に一致するアドレスが見つかりません")]
    UnknownAddress(String),

    #[error(transparent)]
    Engine(#[from] EngineError),
}
