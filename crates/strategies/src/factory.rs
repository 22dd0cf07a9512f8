use crate::error::StrategyError;
use crate::ma_crossover::MACrossover;
use crate::Strategy;
use configuration::AppConfig;
use core_types::{StrategyId, StrategyKind};

/// Creates a new strategy instance for the given configured instance id.
///
/// `kind` selects the algorithm; `config` supplies the relevant parameter
/// block; `symbol` is the market the Worker will subscribe this instance to.
pub fn create_strategy(
    strategy_id: StrategyId,
    kind: StrategyKind,
    config: &AppConfig,
    symbol: &str,
) -> Result<Box<dyn Strategy>, StrategyError> {
    match kind {
        StrategyKind::MovingAverageCrossover => {
            let params = config.ma_crossover.clone();
            Ok(Box::new(MACrossover::new(strategy_id, params, symbol.to_string())?))
        }
    }
}
