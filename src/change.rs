use crate::error::EngineError;
use crate::fee::{SizeModel, estimate_fee};
use crate::types::{ChangeDisposition, TxOutput};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedOutputs {
    /// (送金先, [おつり]) の順
    pub outputs: Vec<TxOutput>,
    pub disposition: ChangeDisposition,
}

/// おつりを後で単独UTXOとして使うときのコスト (1入力1出力のスイープ)
pub fn change_threshold(model: &SizeModel, rate: u64) -> Result<u64, EngineError> {
    estimate_fee(model.estimated_size(1, 1), rate)
}

/// おつりを出力として残すか、マイナーに譲るか、送金先へ合算するかを決める
pub fn resolve_change(
    destination: TxOutput,
    change: u64,
    change_address: &str,
    threshold: u64,
) -> ResolvedOutputs {
    if change == 0 {
        return ResolvedOutputs {
            outputs: vec![destination],
            disposition: ChangeDisposition::None,
        };
    }

    if change < threshold {
        log::warn!(
            "おつり {} sats は再利用コスト {} sats 未満のためマイナーボーナスとします",
            change,
            threshold
        );
        return ResolvedOutputs {
            outputs: vec![destination],
            disposition: ChangeDisposition::Forfeited(change),
        };
    }

    if change_address == destination.address {
        let merged = TxOutput::new(destination.address, destination.value + change);
        log::warn!(
            "おつりアドレスが送金先と同じため出力を合算します: {} sats",
            merged.value
        );
        return ResolvedOutputs {
            outputs: vec![merged],
            disposition: ChangeDisposition::Merged(change),
        };
    }

    log::info!("OUTPUT 1 Address {} Value {}", change_address, change);
    ResolvedOutputs {
        outputs: vec![destination, TxOutput::new(change_address, change)],
        disposition: ChangeDisposition::Output(change),
    }
}
