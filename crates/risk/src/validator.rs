// In crates/risk/src/validator.rs

use core_types::{Action, Context, Decision, Side};
use rust_decimal::Decimal;

use crate::error::Rejection;
use crate::tolerance::{at_least, exceeds, strictly_greater, PRICE_EPSILON, RATIO_EPSILON, USD_EPSILON};
use crate::types::RiskParameters;

/// Checks one decision against the trader's limits and the cycle's context.
///
/// Pure: reads `params` and `context`, never mutates anything. The cooldown guard
/// measures elapsed time against `context.generated_at`.
pub fn validate_decision(
    params: &RiskParameters,
    context: &Context,
    decision: &Decision,
) -> Result<(), Rejection> {
    match decision.action {
        Action::OpenLong | Action::OpenShort => validate_open(params, context, decision),
        Action::CloseLong | Action::CloseShort => validate_close(context, decision),
        Action::Hold | Action::Wait => Ok(()),
    }
}

fn validate_open(params: &RiskParameters, context: &Context, decision: &Decision) -> Result<(), Rejection> {
    let symbol = &decision.symbol;
    if symbol.is_empty() {
        return Err(Rejection::MissingSymbol);
    }
    if decision.leverage == 0 {
        return Err(Rejection::NonPositiveLeverage(decision.leverage));
    }
    if decision.position_size_usd <= Decimal::ZERO {
        return Err(Rejection::NonPositiveSize(decision.position_size_usd));
    }
    if decision.entry_price <= Decimal::ZERO
        || decision.stop_loss <= Decimal::ZERO
        || decision.take_profit <= Decimal::ZERO
    {
        return Err(Rejection::NonPositivePrices);
    }

    check_confidence(params, decision.confidence)?;
    check_price_ordering(params, decision)?;

    // Leverage cap: the tighter of the configured class cap and the venue's limit.
    let mut cap = params.leverage_cap_for(symbol);
    if let Some(asset) = context.asset(symbol) {
        if asset.max_leverage > 0 {
            cap = cap.min(asset.max_leverage);
        }
    }
    if decision.leverage > cap {
        return Err(Rejection::LeverageAboveCap {
            requested: decision.leverage,
            cap,
        });
    }

    let guards = &context.guards;
    let equity = context.account.total_equity;
    let size = decision.position_size_usd;

    if let Some(threshold) = guards.liquidity_threshold_usd {
        if let Some(open_interest_usd) = context.snapshot(symbol).and_then(|s| s.open_interest_usd()) {
            if open_interest_usd + USD_EPSILON < threshold {
                return Err(Rejection::Illiquid {
                    open_interest_usd,
                    threshold,
                });
            }
        }
    }

    if let Some(band) = guards.value_band_for(symbol) {
        if equity > Decimal::ZERO {
            let min = band.min_multiple * equity;
            let max = band.max_multiple * equity;
            let below = band.min_multiple > Decimal::ZERO && size + USD_EPSILON < min;
            let above = band.max_multiple > Decimal::ZERO && size - USD_EPSILON > max;
            if below || above {
                return Err(Rejection::OutsideValueBand { size, min, max });
            }
        }
    }

    if let Some(cap_pct) = guards.max_margin_usage_pct {
        if equity <= Decimal::ZERO {
            return Err(Rejection::NoEquity);
        }
        let added_margin = size / Decimal::from(decision.leverage);
        let projected_pct = (context.account.margin_used + added_margin) / equity * Decimal::ONE_HUNDRED;
        if exceeds(projected_pct, cap_pct, RATIO_EPSILON) {
            return Err(Rejection::MarginUsageExceeded { projected_pct, cap_pct });
        }
    }

    if let Some(cooldown) = guards.cooldown_after_close() {
        if let Some(closed_at) = context.recently_closed.get(symbol) {
            let elapsed = context.generated_at - *closed_at;
            if elapsed < cooldown {
                let remaining = cooldown - elapsed;
                return Err(Rejection::CooldownActive {
                    symbol: symbol.clone(),
                    remaining_secs: remaining.num_seconds(),
                });
            }
        }
    }

    if context.positions.len() >= params.max_positions {
        return Err(Rejection::PositionLimitReached {
            open: context.positions.len(),
            max: params.max_positions,
        });
    }

    // No hedging, no pyramiding: one position per symbol, whatever its side.
    if context.has_position(symbol) {
        return Err(Rejection::PositionExists(symbol.clone()));
    }

    if exceeds(size, params.max_position_size_usd, USD_EPSILON) {
        return Err(Rejection::SizeAboveCap {
            size,
            cap: params.max_position_size_usd,
        });
    }

    Ok(())
}

fn check_confidence(params: &RiskParameters, confidence: i32) -> Result<(), Rejection> {
    if !(0..=100).contains(&confidence) {
        return Err(Rejection::ConfidenceOutOfRange(confidence));
    }
    if confidence < params.min_confidence {
        return Err(Rejection::ConfidenceBelowMinimum {
            confidence,
            minimum: params.min_confidence,
        });
    }
    Ok(())
}

fn check_price_ordering(params: &RiskParameters, decision: &Decision) -> Result<(), Rejection> {
    let (entry, stop_loss, take_profit) = (decision.entry_price, decision.stop_loss, decision.take_profit);
    let ordered = match decision.action.side() {
        Some(Side::Long) => {
            strictly_greater(take_profit, entry, PRICE_EPSILON) && strictly_greater(entry, stop_loss, PRICE_EPSILON)
        }
        Some(Side::Short) => {
            strictly_greater(stop_loss, entry, PRICE_EPSILON) && strictly_greater(entry, take_profit, PRICE_EPSILON)
        }
        None => true,
    };
    if !ordered {
        return Err(Rejection::PriceOrdering {
            side: decision.action.side().unwrap_or(Side::Long),
            entry,
            stop_loss,
            take_profit,
        });
    }

    let ratio = decision.reward_risk_ratio().unwrap_or(Decimal::ZERO);
    if !at_least(ratio, params.min_risk_reward_ratio, RATIO_EPSILON) {
        return Err(Rejection::RewardRiskTooLow {
            ratio,
            minimum: params.min_risk_reward_ratio,
        });
    }
    Ok(())
}

fn validate_close(context: &Context, decision: &Decision) -> Result<(), Rejection> {
    if decision.symbol.is_empty() {
        return Err(Rejection::MissingSymbol);
    }
    let side = match decision.action.side() {
        Some(side) => side,
        None => return Ok(()),
    };
    match context.position(&decision.symbol) {
        Some(position) if position.side == side => Ok(()),
        _ => Err(Rejection::NoPositionToClose {
            symbol: decision.symbol.clone(),
            side,
        }),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::{DateTime, TimeDelta, TimeZone, Utc};
    use core_types::{
        AccountSnapshot, AssetInfo, GuardThresholds, MarketSnapshot, OpenInterest, Position, Symbol, ValueBand,
    };
    use rust_decimal_macros::dec;
    use std::collections::BTreeMap;

    pub(crate) fn make_params() -> RiskParameters {
        RiskParameters {
            max_positions: 3,
            max_position_size_usd: dec!(5000),
            max_margin_usage_pct: dec!(80),
            major_coin_leverage: 10,
            altcoin_leverage: 5,
            min_risk_reward_ratio: dec!(2),
            min_confidence: 60,
        }
    }

    pub(crate) fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).single().expect("valid timestamp")
    }

    pub(crate) fn make_position(symbol: &str, side: Side) -> Position {
        Position {
            symbol: Symbol::new(symbol),
            side,
            quantity: dec!(1),
            entry_price: dec!(100),
            mark_price: dec!(100),
            leverage: 3,
            unrealized_pnl: Decimal::ZERO,
            liquidation_price: None,
        }
    }

    pub(crate) fn make_context(positions: Vec<Position>) -> Context {
        Context {
            trader_id: "t1".into(),
            generated_at: t0(),
            account: AccountSnapshot {
                total_equity: dec!(10000),
                available_balance: dec!(9000),
                margin_used: dec!(1000),
                unrealized_pnl: Decimal::ZERO,
                margin_used_pct: dec!(10),
                position_count: positions.len(),
            },
            positions,
            candidates: Vec::new(),
            market: BTreeMap::new(),
            asset_meta: BTreeMap::new(),
            guards: GuardThresholds {
                max_margin_usage_pct: Some(dec!(80)),
                ..Default::default()
            },
            recently_closed: BTreeMap::new(),
            performance: None,
            major_coin_leverage: 10,
            altcoin_leverage: 5,
        }
    }

    pub(crate) fn make_long(symbol: &str) -> Decision {
        Decision {
            leverage: 3,
            position_size_usd: dec!(1000),
            entry_price: dec!(100),
            stop_loss: dec!(90),
            take_profit: dec!(120),
            confidence: 75,
            ..Decision::new(symbol, Action::OpenLong)
        }
    }

    #[test]
    fn test_valid_long_is_accepted() {
        let ctx = make_context(vec![]);
        assert_eq!(validate_decision(&make_params(), &ctx, &make_long("SOL")), Ok(()));
    }

    #[test]
    fn test_hold_and_wait_always_pass() {
        let ctx = make_context(vec![]);
        for action in [Action::Hold, Action::Wait] {
            assert!(validate_decision(&make_params(), &ctx, &Decision::new("", action)).is_ok());
        }
    }

    #[test]
    fn test_reward_risk_boundary_is_inclusive() {
        let ctx = make_context(vec![]);
        let mut params = make_params();
        params.min_risk_reward_ratio = dec!(2.5);
        for (k, accepted) in [(dec!(2), false), (dec!(2.5), true), (dec!(3), true)] {
            let mut decision = make_long("SOL");
            decision.take_profit = dec!(100) + k * dec!(10);
            let result = validate_decision(&params, &ctx, &decision);
            assert_eq!(result.is_ok(), accepted, "k = {k}");
            if !accepted {
                assert!(matches!(result, Err(Rejection::RewardRiskTooLow { .. })));
            }
        }
    }

    #[test]
    fn test_short_requires_mirrored_prices() {
        let ctx = make_context(vec![]);
        let mut decision = Decision {
            action: Action::OpenShort,
            stop_loss: dec!(110),
            take_profit: dec!(80),
            ..make_long("SOL")
        };
        assert!(validate_decision(&make_params(), &ctx, &decision).is_ok());
        decision.take_profit = dec!(105);
        assert!(matches!(
            validate_decision(&make_params(), &ctx, &decision),
            Err(Rejection::PriceOrdering { side: Side::Short, .. })
        ));
    }

    #[test]
    fn test_basic_field_checks() {
        let ctx = make_context(vec![]);
        let params = make_params();

        let missing = Decision { symbol: Symbol::new(""), ..make_long("SOL") };
        assert_eq!(validate_decision(&params, &ctx, &missing), Err(Rejection::MissingSymbol));

        let no_leverage = Decision { leverage: 0, ..make_long("SOL") };
        assert!(matches!(validate_decision(&params, &ctx, &no_leverage), Err(Rejection::NonPositiveLeverage(0))));

        let no_size = Decision { position_size_usd: Decimal::ZERO, ..make_long("SOL") };
        assert!(matches!(validate_decision(&params, &ctx, &no_size), Err(Rejection::NonPositiveSize(_))));

        let no_stop = Decision { stop_loss: Decimal::ZERO, ..make_long("SOL") };
        assert_eq!(validate_decision(&params, &ctx, &no_stop), Err(Rejection::NonPositivePrices));

        let wild = Decision { confidence: 140, ..make_long("SOL") };
        assert_eq!(validate_decision(&params, &ctx, &wild), Err(Rejection::ConfidenceOutOfRange(140)));

        let timid = Decision { confidence: 40, ..make_long("SOL") };
        assert!(matches!(
            validate_decision(&params, &ctx, &timid),
            Err(Rejection::ConfidenceBelowMinimum { minimum: 60, .. })
        ));
    }

    #[test]
    fn test_leverage_cap_uses_tighter_of_class_and_venue() {
        let mut ctx = make_context(vec![]);
        let params = make_params();

        let too_high = Decision { leverage: 6, ..make_long("SOL") };
        assert_eq!(
            validate_decision(&params, &ctx, &too_high),
            Err(Rejection::LeverageAboveCap { requested: 6, cap: 5 })
        );

        let btc = Decision { leverage: 8, ..make_long("BTC") };
        assert!(validate_decision(&params, &ctx, &btc).is_ok());

        ctx.asset_meta.insert(
            Symbol::new("BTC"),
            AssetInfo {
                symbol: Symbol::new("BTC"),
                index: 0,
                size_decimals: 5,
                price_decimals: 1,
                max_leverage: 7,
                only_isolated: false,
                is_active: true,
            },
        );
        assert_eq!(
            validate_decision(&params, &ctx, &btc),
            Err(Rejection::LeverageAboveCap { requested: 8, cap: 7 })
        );
    }

    #[test]
    fn test_liquidity_guard_uses_open_interest_value() {
        let mut ctx = make_context(vec![]);
        ctx.guards.liquidity_threshold_usd = Some(dec!(1_000_000));
        ctx.market.insert(
            Symbol::new("SOL"),
            MarketSnapshot {
                symbol: Symbol::new("SOL"),
                price: dec!(100),
                change_1h: 1.0,
                change_4h: 2.0,
                indicators: Default::default(),
                open_interest: Some(OpenInterest {
                    latest: dec!(5000),
                    average: dec!(5000),
                }),
                funding: None,
            },
        );
        assert!(matches!(
            validate_decision(&make_params(), &ctx, &make_long("SOL")),
            Err(Rejection::Illiquid { .. })
        ));

        ctx.guards.liquidity_threshold_usd = Some(dec!(500_000));
        assert!(validate_decision(&make_params(), &ctx, &make_long("SOL")).is_ok());
    }

    #[test]
    fn test_value_band_bounds_size_by_equity() {
        let mut ctx = make_context(vec![]);
        ctx.guards.altcoin_value_band = Some(ValueBand {
            min_multiple: dec!(0.05),
            max_multiple: dec!(0.3),
        });
        let small = Decision { position_size_usd: dec!(400), ..make_long("SOL") };
        assert!(matches!(
            validate_decision(&make_params(), &ctx, &small),
            Err(Rejection::OutsideValueBand { .. })
        ));
        let exact_max = Decision { position_size_usd: dec!(3000), ..make_long("SOL") };
        assert!(validate_decision(&make_params(), &ctx, &exact_max).is_ok());
        let large = Decision { position_size_usd: dec!(3000.5), ..make_long("SOL") };
        assert!(validate_decision(&make_params(), &ctx, &large).is_err());
    }

    #[test]
    fn test_margin_usage_guard() {
        let ctx = make_context(vec![]);
        // 1000 used + 4800/3 = 2600 -> 26%, fine.
        let ok = Decision { position_size_usd: dec!(4800), ..make_long("SOL") };
        assert!(validate_decision(&make_params(), &ctx, &ok).is_ok());

        let mut params = make_params();
        params.max_margin_usage_pct = dec!(20);
        let mut tight = make_context(vec![]);
        tight.guards.max_margin_usage_pct = Some(dec!(20));
        assert!(matches!(
            validate_decision(&params, &tight, &ok),
            Err(Rejection::MarginUsageExceeded { .. })
        ));
    }

    #[test]
    fn test_cooldown_window() {
        let mut ctx = make_context(vec![]);
        ctx.guards.cooldown_after_close_secs = Some(900);
        let closed_at = t0();
        ctx.recently_closed.insert(Symbol::new("SOL"), closed_at);

        ctx.generated_at = closed_at + TimeDelta::seconds(899);
        assert!(matches!(
            validate_decision(&make_params(), &ctx, &make_long("SOL")),
            Err(Rejection::CooldownActive { remaining_secs: 1, .. })
        ));

        ctx.generated_at = closed_at + TimeDelta::seconds(901);
        assert!(validate_decision(&make_params(), &ctx, &make_long("SOL")).is_ok());
    }

    #[test]
    fn test_position_limit_and_no_pyramiding() {
        let mut params = make_params();
        params.max_positions = 2;
        let full = make_context(vec![make_position("A", Side::Long), make_position("B", Side::Short)]);
        assert_eq!(
            validate_decision(&params, &full, &make_long("C")),
            Err(Rejection::PositionLimitReached { open: 2, max: 2 })
        );

        let one = make_context(vec![make_position("SOL", Side::Short)]);
        assert_eq!(
            validate_decision(&params, &one, &make_long("sol")),
            Err(Rejection::PositionExists(Symbol::new("SOL")))
        );
    }

    #[test]
    fn test_size_cap() {
        let mut ctx = make_context(vec![]);
        ctx.guards.max_margin_usage_pct = None;
        let decision = Decision { position_size_usd: dec!(5000.5), ..make_long("SOL") };
        assert!(matches!(
            validate_decision(&make_params(), &ctx, &decision),
            Err(Rejection::SizeAboveCap { .. })
        ));
    }

    #[test]
    fn test_close_requires_matching_position() {
        let ctx = make_context(vec![make_position("A", Side::Long)]);
        let params = make_params();
        assert!(validate_decision(&params, &ctx, &Decision::new("A", Action::CloseLong)).is_ok());
        assert!(matches!(
            validate_decision(&params, &ctx, &Decision::new("A", Action::CloseShort)),
            Err(Rejection::NoPositionToClose { side: Side::Short, .. })
        ));
        assert!(validate_decision(&params, &ctx, &Decision::new("Z", Action::CloseLong)).is_err());
    }
}
