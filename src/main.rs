//! Perpetual clearing house simulation.
//!
//! Runs one pair through the full lifecycle against the mocked pool, oracle
//! and ledger: opening and closing, funding, liquidation and settlement.
//! Set `RUST_LOG=perp_clearinghouse=debug` to follow every event.

use perp_clearinghouse::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing_subscriber::EnvFilter;

type SimEngine = Engine<VpoolSet, PriceFeed, Ledger>;

const BLOCK_TIME_MS: i64 = 5_000;
const HALF_HOUR_MS: i64 = 30 * 60 * 1000;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("Perpetual Clearing House Simulation");
    println!("Single Pair, Isolated Margin, Full Lifecycle\n");

    scenario_1_open_and_close();
    scenario_2_funding();
    scenario_3_liquidation();
    scenario_4_settlement();

    println!("\nAll simulations completed.");
}

fn pair() -> Pair {
    Pair::new("ubtc", "unusd").unwrap()
}

/// Pool at price 10 with 10M quote of depth, oracle at 10, every trader funded.
fn setup(traders: &[&Address]) -> SimEngine {
    let block = BlockContext::new(1, Timestamp::now());

    let mut pools = VpoolSet::new();
    pools.add_pool(
        Vpool::new(pair(), dec!(10000000), dec!(1000000), VpoolConfig::default(), &block).unwrap(),
    );

    let mut oracle = PriceFeed::new(Params::default().twap_lookback_window_ms);
    oracle.set_price("ubtc", "unusd", dec!(10));

    let mut ledger = Ledger::new();
    for trader in traders {
        ledger.mint(trader, "unusd", dec!(1000000));
    }

    let mut engine = Engine::new(Params::default(), EngineConfig::default(), pools, oracle, ledger).unwrap();
    engine.add_pair(pair()).unwrap();
    engine.set_block(block);
    engine
}

fn print_position(engine: &SimEngine, name: &str, trader: &Address) {
    match engine.query_position(&pair(), trader) {
        Ok(info) => println!(
            "    {name}: size {}, margin {}, notional {}, pnl {}, margin ratio {}",
            info.position.size.round_dp(4),
            info.position.margin.round_dp(2),
            info.position_notional.round_dp(2),
            info.unrealized_pnl.round_dp(2),
            info.margin_ratio_mark.round_dp(4),
        ),
        Err(err) => println!("    {name}: {err}"),
    }
}

fn print_balance(engine: &SimEngine, name: &str, address: &Address) {
    println!("    {name}: {} unusd", engine.bank().balance(address, "unusd"));
}

/// Long at 10x, price pushed up by another trader, then closed.
fn scenario_1_open_and_close() {
    println!("Scenario 1: Open and Close\n");

    let alice = Address::new("alice");
    let bob = Address::new("bob");
    let mut engine = setup(&[&alice, &bob]);

    engine
        .open_position(&pair(), Side::Long, &alice, dec!(1000), dec!(10), Decimal::ZERO)
        .unwrap();
    println!("  Alice opens 1000 unusd long at 10x");
    print_position(&engine, "alice", &alice);

    engine.advance_block(BLOCK_TIME_MS);
    engine
        .open_position(&pair(), Side::Long, &bob, dec!(10000), dec!(5), Decimal::ZERO)
        .unwrap();
    println!("  Bob buys 50000 unusd of notional, mark moves to {}", engine.vpool().mark_price(&pair()).unwrap().round_dp(4));
    print_position(&engine, "alice", &alice);

    engine.advance_block(BLOCK_TIME_MS);
    let resp = engine.close_position(&pair(), &alice).unwrap();
    println!("  Alice closes, realized pnl {}", resp.realized_pnl.round_dp(2));
    print_balance(&engine, "alice", &alice);
    print_balance(&engine, "fee pool", &ModuleAccount::FeePool.address());
    print_balance(&engine, "ecosystem fund", &ModuleAccount::PerpEcosystemFund.address());
    println!();
}

/// Mark above index: longs pay the premium into their margin.
fn scenario_2_funding() {
    println!("Scenario 2: Funding\n");

    let alice = Address::new("alice");
    let mut engine = setup(&[&alice]);

    engine
        .open_position(&pair(), Side::Long, &alice, dec!(1000), dec!(10), Decimal::ZERO)
        .unwrap();
    print_position(&engine, "alice", &alice);

    engine.oracle_mut().set_price("ubtc", "unusd", dec!(9.9));
    for _ in 0..(HALF_HOUR_MS / BLOCK_TIME_MS) {
        engine.advance_block(BLOCK_TIME_MS);
    }

    let epoch = EpochInfo {
        identifier: engine.params().funding_rate_interval.clone(),
        duration_ms: HALF_HOUR_MS,
    };
    for result in engine.after_epoch_end(&epoch) {
        println!(
            "  {}: mark {}, index {}, funding rate {}, cumulative premium {}",
            result.pair,
            result.mark_price.round_dp(4),
            result.index_price.round_dp(4),
            result.funding_rate.round_dp(6),
            result.cumulative_premium_fraction.round_dp(6),
        );
    }

    let change = engine
        .add_margin(&pair(), &alice, Coin::new("unusd", dec!(100)))
        .unwrap();
    println!("  Alice adds 100 margin, funding paid {}", change.funding_payment.round_dp(4));
    print_position(&engine, "alice", &alice);
    println!();
}

/// A large short drags the price down until a 10x long falls below maintenance.
fn scenario_3_liquidation() {
    println!("Scenario 3: Liquidation\n");

    let carol = Address::new("carol");
    let dave = Address::new("dave");
    let liquidator = Address::new("liquidator");
    let mut engine = setup(&[&carol, &dave]);

    engine
        .open_position(&pair(), Side::Long, &carol, dec!(1000), dec!(10), Decimal::ZERO)
        .unwrap();
    print_position(&engine, "carol", &carol);

    engine.advance_block(BLOCK_TIME_MS);
    match engine.open_position(&pair(), Side::Short, &dave, dec!(40000), dec!(10), Decimal::ZERO) {
        Ok(_) => println!(
            "  Dave shorts 400000 unusd of notional, mark moves to {}",
            engine.vpool().mark_price(&pair()).unwrap().round_dp(4)
        ),
        Err(err) => println!("  Dave's short rejected: {err}"),
    }
    print_position(&engine, "carol", &carol);

    let requests = vec![
        LiquidationRequest {
            pair: pair(),
            trader: carol.clone(),
        },
        LiquidationRequest {
            pair: pair(),
            trader: dave.clone(),
        },
    ];
    match engine.multi_liquidate(&liquidator, &requests) {
        Ok(results) => {
            for result in results {
                match result.outcome {
                    Ok(outcome) => println!(
                        "  Liquidated {}: partial {}, liquidator fee {}, ecosystem fund fee {}, bad debt {}",
                        result.request.trader,
                        outcome.partial,
                        outcome.fee_to_liquidator,
                        outcome.fee_to_perp_ecosystem_fund,
                        outcome.bad_debt.round_dp(2),
                    ),
                    Err(err) => println!("  Skipped {}: {err}", result.request.trader),
                }
            }
        }
        Err(err) => println!("  No liquidation went through: {err}"),
    }
    print_balance(&engine, "liquidator", &liquidator);
    print_balance(&engine, "vault", &ModuleAccount::Vault.address());
    println!();
}

/// Pool deactivated, positions paid out at the frozen price.
fn scenario_4_settlement() {
    println!("Scenario 4: Settlement\n");

    let alice = Address::new("alice");
    let bob = Address::new("bob");
    let mut engine = setup(&[&alice, &bob]);

    engine
        .open_position(&pair(), Side::Long, &alice, dec!(1000), dec!(5), Decimal::ZERO)
        .unwrap();
    engine
        .open_position(&pair(), Side::Short, &bob, dec!(500), dec!(5), Decimal::ZERO)
        .unwrap();
    engine.advance_block(BLOCK_TIME_MS);

    let price = engine.vpool_mut().deactivate(&pair()).unwrap();
    println!("  Pool deactivated at {}", price.round_dp(4));

    for (name, trader) in [("alice", &alice), ("bob", &bob)] {
        match engine.settle_position(&pair(), trader) {
            Ok(coins) => {
                let paid: Vec<String> = coins.iter().map(Coin::to_string).collect();
                println!("  {name} settled, paid [{}]", paid.join(", "));
            }
            Err(err) => println!("  {name} not settled: {err}"),
        }
    }
    print_balance(&engine, "vault", &ModuleAccount::Vault.address());
    println!("  {} events recorded, latest:", engine.events().len());
    for event in engine.recent_events(3) {
        println!("    #{} {}", event.id.0, event.payload.kind());
    }
}
