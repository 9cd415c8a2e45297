//! End-to-end flows through the orchestrator

use super::*;
use yieldvault_common::constants::percent::YIELD_FULL_PERCENT;
use yieldvault_common::constants::precision::PRICE_PRECISION;
use yieldvault_common::constants::receipts::NFT_MINTED_SHARES;
use yieldvault_common::constants::GHOST_STRATEGY;
use yieldvault_common::events::EventType;
use yieldvault_common::guard::{BlocklistGuards, FixedAllocation};
use yieldvault_common::oracle::FixedPriceFeed;
use yieldvault_common::types::RateBounds;
use yieldvault_strategy::LendingPool;
use yieldvault_strategy_registry::{ContinueParams, DhwGroup, StrategyDhwParams};

type KernelWith<G> = SmartVaultManager<FixedPriceFeed, G, FixedAllocation>;
type Kernel = KernelWith<BlocklistGuards>;

const ONE: u128 = 1_000_000_000_000_000_000;
const USDC: Address = [0xA1; 32];
const LENDING_A: StrategyId = [0x51; 32];
const LENDING_B: StrategyId = [0x52; 32];
const STAKING: StrategyId = [0x53; 32];
const VAULT: VaultId = [0x71; 32];
const ADMIN: Address = [0xAD; 32];
const KEEPER: Address = [0xBE; 32];
const FEE_RECIPIENT: Address = [0xF1; 32];
const COOLDOWN: u64 = 100;

fn user1() -> Address {
    [1u8; 32]
}

fn user2() -> Address {
    [2u8; 32]
}

fn at(caller: Address, timestamp: u64) -> CallContext {
    CallContext { caller, timestamp }
}

fn config() -> KernelConfig {
    let mut config = KernelConfig::with_recipients([0xE0; 32], [0xE1; 32]);
    config.platform_fees.ecosystem_fee_pct = 0;
    config.platform_fees.treasury_fee_pct = 0;
    config.unstake_cooldown = COOLDOWN;
    config
}

fn kernel() -> (Kernel, AssetGroupId) {
    kernel_with(BlocklistGuards::new())
}

/// Kernel with one USDC group, two lending strategies and a staking one
fn kernel_with<G: GuardEngine>(guards: G) -> (KernelWith<G>, AssetGroupId) {
    let feed = FixedPriceFeed::new().with_rate(USDC, PRICE_PRECISION);
    let mut kernel = KernelWith::<G>::new(ADMIN, config(), feed, guards, FixedAllocation).unwrap();
    let admin = at(ADMIN, 0);
    kernel.grant_role(&admin, Role::DoHardWorker, KEEPER).unwrap();
    kernel
        .grant_role(&admin, Role::EmergencyWithdrawalExecutor, ADMIN)
        .unwrap();

    let group = kernel.register_asset_group(&admin, &[USDC]).unwrap();
    for id in [LENDING_A, LENDING_B] {
        kernel
            .register_strategy(&admin, id, group, Venue::LendingPool(LendingPool::new(1)), None)
            .unwrap();
    }
    let staking = kernel.cooldown_venue(group).unwrap();
    kernel.register_strategy(&admin, STAKING, group, staking, None).unwrap();
    (kernel, group)
}

fn create_vault<G: GuardEngine>(kernel: &mut KernelWith<G>, group: AssetGroupId, strategies: Vec<StrategyId>, fees: SmartVaultFees) {
    let allocation = if strategies.len() == 2 {
        vec![60_00, 40_00]
    } else {
        vec![100_00]
    };
    kernel
        .create_vault(
            &at(ADMIN, 0),
            VaultParams {
                id: VAULT,
                asset_group_id: group,
                strategies,
                allocation,
                fees,
                fee_recipient: FEE_RECIPIENT,
            },
        )
        .unwrap();
}

/// 60/40 vault over the two lending strategies
fn lending_vault() -> (Kernel, AssetGroupId) {
    let (mut kernel, group) = kernel();
    create_vault(&mut kernel, group, vec![LENDING_A, LENDING_B], SmartVaultFees::default());
    (kernel, group)
}

fn dhw_batch<G: GuardEngine>(kernel: &KernelWith<G>, group: AssetGroupId, strategies: &[StrategyId]) -> DhwBatch {
    let strategies = strategies
        .iter()
        .map(|id| StrategyDhwParams {
            strategy: *id,
            guard: kernel
                .registry()
                .net_flow(id, &[PRICE_PRECISION])
                .unwrap()
                .any_guard(),
            compound: None,
        })
        .collect();
    DhwBatch {
        groups: vec![DhwGroup {
            asset_group_id: group,
            tokens: vec![USDC],
            exchange_rate_bounds: vec![RateBounds::unbounded()],
            strategies,
        }],
        valid_until: u64::MAX,
    }
}

fn dhw<G: GuardEngine>(kernel: &mut KernelWith<G>, group: AssetGroupId, strategies: &[StrategyId], now: u64) {
    let batch = dhw_batch(kernel, group, strategies);
    kernel.do_hard_work(&at(KEEPER, now), &batch).unwrap();
}

/// Deposit, flush, settle, sync and claim; returns the claimed vault shares
fn invest<G: GuardEngine>(kernel: &mut KernelWith<G>, group: AssetGroupId, user: Address, amount: u128, now: u64) -> u128 {
    let receipt = kernel
        .deposit(&at(user, now), &VAULT, &[amount], &user, None, true)
        .unwrap();
    dhw(kernel, group, &[LENDING_A, LENDING_B], now + 1);
    kernel.sync_smart_vault(&at(user, now + 2), &VAULT).unwrap();
    kernel
        .claim_smart_vault_tokens(&at(user, now + 2), &VAULT, &[receipt], &[NFT_MINTED_SHARES])
        .unwrap()
}

fn assert_close(actual: u128, expected: u128) {
    assert!(
        actual.abs_diff(expected) <= 1,
        "expected {expected}, got {actual}"
    );
}

// ============ Round Trips ============

#[test]
fn test_deposit_and_redeem_round_trip() {
    let (mut kernel, group) = lending_vault();

    let shares = invest(&mut kernel, group, user1(), 1_000 * ONE, 10);
    assert_eq!(shares, 1_000 * ONE * 1_000);
    assert_eq!(kernel.vault(&VAULT).unwrap().shares.balance_of(&user1()), shares);
    assert_eq!(kernel.registry().strategy_value(&LENDING_A, &[PRICE_PRECISION]).unwrap(), 600 * ONE);
    assert_eq!(kernel.registry().strategy_value(&LENDING_B, &[PRICE_PRECISION]).unwrap(), 400 * ONE);

    let receipt = kernel
        .redeem(&at(user1(), 20), &VAULT, shares, &user1(), true)
        .unwrap();
    dhw(&mut kernel, group, &[LENDING_A, LENDING_B], 21);
    let synced = kernel.sync_smart_vault(&at(user1(), 22), &VAULT).unwrap();
    assert_eq!(synced.len(), 1);
    assert_close(synced[0].assets_withdrawn[0], 1_000 * ONE);

    let paid = kernel
        .claim_withdrawal(&at(user1(), 23), &VAULT, &[receipt], &[NFT_MINTED_SHARES])
        .unwrap();
    assert_close(paid[0], 1_000 * ONE);
    assert_close(kernel.ledger().paid_out(&user1(), &USDC), 1_000 * ONE);
    assert_eq!(kernel.vault(&VAULT).unwrap().shares.total_supply(), 0);

    let events = kernel.events();
    assert_eq!(events.filter_by_type(EventType::SmartVaultFlushed).len(), 2);
    assert_eq!(events.filter_by_type(EventType::SmartVaultSynced).len(), 2);
    assert_eq!(events.filter_by_type(EventType::StrategyDhw).len(), 4);
    assert_eq!(events.filter_by_type(EventType::WithdrawalClaimed).len(), 1);
}

#[test]
fn test_yield_flows_to_redeemer() {
    let (mut kernel, group) = lending_vault();
    let shares = invest(&mut kernel, group, user1(), 1_000 * ONE, 10);

    // +10% on the 600 leg
    kernel
        .venue_mut(&LENDING_A)
        .unwrap()
        .as_lending_pool_mut()
        .unwrap()
        .accrue(YIELD_FULL_PERCENT / 10)
        .unwrap();

    let receipt = kernel
        .redeem(&at(user1(), 20), &VAULT, shares, &user1(), true)
        .unwrap();
    dhw(&mut kernel, group, &[LENDING_A, LENDING_B], 21);
    kernel.sync_smart_vault(&at(user1(), 22), &VAULT).unwrap();
    let paid = kernel
        .claim_withdrawal(&at(user1(), 23), &VAULT, &[receipt], &[NFT_MINTED_SHARES])
        .unwrap();
    assert_close(paid[0], 1_060 * ONE);
}

#[test]
fn test_platform_fees_dilute_strategy_not_vault() {
    let (mut kernel, group) = lending_vault();
    let shares = invest(&mut kernel, group, user1(), 1_000 * ONE, 10);
    kernel
        .set_platform_fees(
            &at(ADMIN, 15),
            PlatformFees {
                ecosystem_fee_receiver: [0xE0; 32],
                ecosystem_fee_pct: 6_00,
                treasury_fee_receiver: [0xE1; 32],
                treasury_fee_pct: 4_00,
            },
        )
        .unwrap();

    kernel
        .venue_mut(&LENDING_A)
        .unwrap()
        .as_lending_pool_mut()
        .unwrap()
        .accrue(YIELD_FULL_PERCENT / 10)
        .unwrap();
    dhw(&mut kernel, group, &[LENDING_A], 20);

    // 60 of yield, 10% of it to the platform
    let registry = kernel.registry();
    let held = registry.share_balance(&LENDING_A, &VAULT).unwrap();
    let supply = registry.share_supply(&LENDING_A).unwrap();
    let value = registry.strategy_value(&LENDING_A, &[PRICE_PRECISION]).unwrap();
    let vault_value = held * (value / ONE) / supply;
    assert!((653..=654).contains(&vault_value));
    assert!(registry.share_balance(&LENDING_A, &[0xE0; 32]).unwrap() > 0);
    assert!(registry.share_balance(&LENDING_A, &[0xE1; 32]).unwrap() > 0);
    assert_eq!(kernel.vault(&VAULT).unwrap().shares.total_supply(), shares);
    assert_eq!(kernel.events().filter_by_type(EventType::PlatformFeesMinted).len(), 1);
}

#[test]
fn test_later_depositor_pays_for_accrued_yield() {
    let (mut kernel, group) = lending_vault();
    let first = invest(&mut kernel, group, user1(), 1_000 * ONE, 10);

    kernel
        .venue_mut(&LENDING_A)
        .unwrap()
        .as_lending_pool_mut()
        .unwrap()
        .accrue(YIELD_FULL_PERCENT / 10)
        .unwrap();
    let second = invest(&mut kernel, group, user2(), 1_060 * ONE, 20);

    assert!(second < first + first / 100);
    assert!(second > first - first / 100);
    let vault = kernel.vault(&VAULT).unwrap();
    assert_eq!(vault.shares.total_supply(), first + second);
    vault.shares.check_conservation().unwrap();
}

#[test]
fn test_sync_catches_up_on_several_flushes() {
    let (mut kernel, group) = lending_vault();
    let r1 = kernel
        .deposit(&at(user1(), 10), &VAULT, &[100 * ONE], &user1(), None, true)
        .unwrap();
    dhw(&mut kernel, group, &[LENDING_A, LENDING_B], 11);
    let r2 = kernel
        .deposit(&at(user2(), 12), &VAULT, &[300 * ONE], &user2(), None, true)
        .unwrap();
    dhw(&mut kernel, group, &[LENDING_A, LENDING_B], 13);

    let synced = kernel.sync_smart_vault(&at(user1(), 14), &VAULT).unwrap();
    assert_eq!(synced.iter().map(|s| s.flush_index).collect::<Vec<_>>(), vec![0, 1]);
    assert!(kernel.vault(&VAULT).unwrap().flush_index.is_synced());

    let s1 = kernel
        .claim_smart_vault_tokens(&at(user1(), 15), &VAULT, &[r1], &[NFT_MINTED_SHARES])
        .unwrap();
    let s2 = kernel
        .claim_smart_vault_tokens(&at(user2(), 15), &VAULT, &[r2], &[NFT_MINTED_SHARES])
        .unwrap();
    assert_close(s2, s1 * 3);

    // Nothing left to sync
    assert!(kernel.sync_smart_vault(&at(user1(), 16), &VAULT).unwrap().is_empty());
}

// ============ Settlement Ordering ============

#[test]
fn test_sync_requires_settled_epochs() {
    let (mut kernel, group) = lending_vault();
    let receipt = kernel
        .deposit(&at(user1(), 10), &VAULT, &[100 * ONE], &user1(), None, true)
        .unwrap();

    assert!(matches!(
        kernel.sync_smart_vault(&at(user1(), 11), &VAULT),
        Err(VaultError::DhwNotSettled { .. })
    ));
    assert!(matches!(kernel.simulate_sync(&VAULT), Err(VaultError::DhwNotSettled { .. })));
    assert!(matches!(
        kernel.claim_smart_vault_tokens(&at(user1(), 11), &VAULT, &[receipt], &[NFT_MINTED_SHARES]),
        Err(VaultError::DepositNotSyncedYet { flush_index: 0 })
    ));

    dhw(&mut kernel, group, &[LENDING_A, LENDING_B], 12);
    let preview = kernel.simulate_sync(&VAULT).unwrap();
    let synced = kernel.sync_smart_vault(&at(user1(), 13), &VAULT).unwrap();
    assert_eq!(synced[0].deposits, preview);
}

#[test]
fn test_flush_overlap_rolls_back() {
    let (mut kernel, _) = lending_vault();
    kernel
        .deposit(&at(user1(), 10), &VAULT, &[100 * ONE], &user1(), None, true)
        .unwrap();
    kernel
        .deposit(&at(user1(), 11), &VAULT, &[50 * ONE], &user1(), None, false)
        .unwrap();

    assert!(matches!(
        kernel.flush_smart_vault(&at(KEEPER, 12), &VAULT),
        Err(VaultError::FlushOverlap { dhw_index: 1, .. })
    ));
    // Still pending, flush index unchanged
    assert_eq!(
        kernel.state().deposits.pending_deposits(&VAULT),
        Some(&[50 * ONE][..])
    );
    assert_eq!(kernel.vault(&VAULT).unwrap().flush_index.current, 1);
}

#[test]
fn test_flush_with_nothing_pending() {
    let (mut kernel, _) = lending_vault();
    assert_eq!(
        kernel.flush_smart_vault(&at(KEEPER, 1), &VAULT),
        Err(VaultError::NothingToFlush)
    );
}

#[test]
fn test_non_atomic_redeem_waits_for_continuation() {
    let (mut kernel, group) = kernel();
    create_vault(&mut kernel, group, vec![STAKING], SmartVaultFees::default());

    let receipt = kernel
        .deposit(&at(user1(), 10), &VAULT, &[500 * ONE], &user1(), None, true)
        .unwrap();
    dhw(&mut kernel, group, &[STAKING], 11);
    kernel.sync_smart_vault(&at(user1(), 12), &VAULT).unwrap();
    let shares = kernel
        .claim_smart_vault_tokens(&at(user1(), 12), &VAULT, &[receipt], &[NFT_MINTED_SHARES])
        .unwrap();

    // Fast redeem is atomic only
    assert_eq!(
        kernel.redeem_fast(&at(user1(), 13), &VAULT, shares / 2, &[SlippageGuard::redeem_any()]),
        Err(VaultError::NonAtomicStrategy { strategy: STAKING })
    );

    let receipt = kernel
        .redeem(&at(user1(), 20), &VAULT, shares, &user1(), true)
        .unwrap();
    dhw(&mut kernel, group, &[STAKING], 21);
    assert!(kernel.registry().has_pending_continuation(&STAKING));
    assert!(matches!(
        kernel.sync_smart_vault(&at(user1(), 22), &VAULT),
        Err(VaultError::DhwNotSettled { strategy: STAKING, .. })
    ));

    let batch = DhwContinueBatch {
        strategies: vec![ContinueParams {
            strategy: STAKING,
            guard: SlippageGuard::redeem_any(),
            data: Vec::new(),
        }],
        valid_until: u64::MAX,
    };
    assert!(matches!(
        kernel.do_hard_work_continue(&at(KEEPER, 22), &batch),
        Err(VaultError::CooldownNotElapsed { .. })
    ));
    kernel.do_hard_work_continue(&at(KEEPER, 21 + COOLDOWN), &batch).unwrap();

    kernel.sync_smart_vault(&at(user1(), 200), &VAULT).unwrap();
    let paid = kernel
        .claim_withdrawal(&at(user1(), 200), &VAULT, &[receipt], &[NFT_MINTED_SHARES])
        .unwrap();
    assert_close(paid[0], 500 * ONE);
}

#[test]
fn test_fast_redeem_from_lending_vault() {
    let (mut kernel, group) = lending_vault();
    let shares = invest(&mut kernel, group, user1(), 1_000 * ONE, 10);

    let guards = [SlippageGuard::redeem_any(), SlippageGuard::redeem_any()];
    let assets = kernel
        .redeem_fast(&at(user1(), 20), &VAULT, shares / 4, &guards)
        .unwrap();
    assert_close(assets[0], 250 * ONE);
    assert_close(kernel.ledger().paid_out(&user1(), &USDC), 250 * ONE);
    assert_eq!(
        kernel.vault(&VAULT).unwrap().shares.balance_of(&user1()),
        shares - shares / 4
    );
    assert_eq!(kernel.events().filter_by_type(EventType::FastRedeem).len(), 1);

    // Too many shares: nothing burned
    assert!(matches!(
        kernel.redeem_fast(&at(user1(), 21), &VAULT, shares, &guards),
        Err(VaultError::InsufficientBalance { .. })
    ));
    assert_eq!(
        kernel.vault(&VAULT).unwrap().shares.balance_of(&user1()),
        shares - shares / 4
    );
}

// ============ Unflushed Redemptions ============

#[test]
fn test_sync_prices_unflushed_redemptions() {
    let (mut kernel, group) = lending_vault();
    let s1 = invest(&mut kernel, group, user1(), 1_000 * ONE, 10);

    let deposit = kernel
        .deposit(&at(user2(), 20), &VAULT, &[1_000 * ONE], &user2(), None, true)
        .unwrap();
    // Burned now, strategy shares released only at the next flush
    let w1 = kernel
        .redeem(&at(user1(), 21), &VAULT, s1 / 2, &user1(), false)
        .unwrap();
    dhw(&mut kernel, group, &[LENDING_A, LENDING_B], 22);
    kernel.sync_smart_vault(&at(user2(), 23), &VAULT).unwrap();
    let s2 = kernel
        .claim_smart_vault_tokens(&at(user2(), 23), &VAULT, &[deposit], &[NFT_MINTED_SHARES])
        .unwrap();
    assert_eq!(s2, s1);

    kernel.flush_smart_vault(&at(ADMIN, 24), &VAULT).unwrap();
    dhw(&mut kernel, group, &[LENDING_A, LENDING_B], 25);
    kernel.sync_smart_vault(&at(user1(), 26), &VAULT).unwrap();
    let paid = kernel
        .claim_withdrawal(&at(user1(), 26), &VAULT, &[w1], &[NFT_MINTED_SHARES])
        .unwrap();
    assert_close(paid[0], 500 * ONE);

    let w2 = kernel.redeem(&at(user2(), 27), &VAULT, s2, &user2(), true).unwrap();
    dhw(&mut kernel, group, &[LENDING_A, LENDING_B], 28);
    kernel.sync_smart_vault(&at(user2(), 29), &VAULT).unwrap();
    let paid = kernel
        .claim_withdrawal(&at(user2(), 29), &VAULT, &[w2], &[NFT_MINTED_SHARES])
        .unwrap();
    assert_close(paid[0], 1_000 * ONE);
}

#[test]
fn test_simulate_sync_counts_unflushed_redemptions() {
    let (mut kernel, group) = lending_vault();
    let s1 = invest(&mut kernel, group, user1(), 1_000 * ONE, 10);
    kernel
        .deposit(&at(user2(), 20), &VAULT, &[1_000 * ONE], &user2(), None, true)
        .unwrap();
    kernel
        .redeem(&at(user1(), 21), &VAULT, s1 / 2, &user1(), false)
        .unwrap();
    dhw(&mut kernel, group, &[LENDING_A, LENDING_B], 22);

    let preview = kernel.simulate_sync(&VAULT).unwrap();
    assert_eq!(preview.existing_value, 1_000 * ONE);
    assert_eq!(preview.vault_shares_minted, s1);
    let synced = kernel.sync_smart_vault(&at(user2(), 23), &VAULT).unwrap();
    assert_eq!(synced[0].deposits, preview);
}

#[test]
fn test_fast_redeem_after_unflushed_redeem() {
    let (mut kernel, group) = lending_vault();
    let s1 = invest(&mut kernel, group, user1(), 1_000 * ONE, 10);
    let s2 = invest(&mut kernel, group, user2(), 1_000 * ONE, 20);

    let w1 = kernel.redeem(&at(user1(), 30), &VAULT, s1, &user1(), false).unwrap();
    let guards = [SlippageGuard::redeem_any(), SlippageGuard::redeem_any()];
    let fast = kernel.redeem_fast(&at(user2(), 31), &VAULT, s2, &guards).unwrap();
    assert_close(fast[0], 1_000 * ONE);

    kernel.flush_smart_vault(&at(ADMIN, 32), &VAULT).unwrap();
    dhw(&mut kernel, group, &[LENDING_A, LENDING_B], 33);
    kernel.sync_smart_vault(&at(user1(), 34), &VAULT).unwrap();
    let paid = kernel
        .claim_withdrawal(&at(user1(), 34), &VAULT, &[w1], &[NFT_MINTED_SHARES])
        .unwrap();
    assert_close(paid[0], 1_000 * ONE);
    assert_eq!(kernel.ledger().balance_of(&USDC), 0);
}

// ============ Access and Guards ============

#[test]
fn test_roles_gate_entry_points() {
    let (mut kernel, group) = kernel();
    let outsider = at(user1(), 0);

    assert!(matches!(
        kernel.register_asset_group(&outsider, &[[0xA2; 32]]),
        Err(VaultError::MissingRole { role: Role::Admin, .. })
    ));
    assert!(matches!(
        kernel.create_vault(
            &outsider,
            VaultParams {
                id: VAULT,
                asset_group_id: group,
                strategies: vec![LENDING_A],
                allocation: vec![100_00],
                fees: SmartVaultFees::default(),
                fee_recipient: FEE_RECIPIENT,
            },
        ),
        Err(VaultError::MissingRole { .. })
    ));
    let batch = dhw_batch(&kernel, group, &[LENDING_A]);
    assert!(matches!(
        kernel.do_hard_work(&outsider, &batch),
        Err(VaultError::MissingRole { role: Role::DoHardWorker, .. })
    ));

    // Integrators may create vaults
    kernel
        .grant_role(&at(ADMIN, 0), Role::VaultIntegrator, user1())
        .unwrap();
    kernel
        .create_vault(
            &outsider,
            VaultParams {
                id: VAULT,
                asset_group_id: group,
                strategies: vec![LENDING_A],
                allocation: vec![100_00],
                fees: SmartVaultFees::default(),
                fee_recipient: FEE_RECIPIENT,
            },
        )
        .unwrap();
}

#[test]
fn test_guards_block_requests() {
    let (mut kernel, group) = lending_vault();
    let shares = invest(&mut kernel, group, user1(), 100 * ONE, 10);
    kernel.guards_mut().block(user2());

    assert_eq!(
        kernel.deposit(&at(user2(), 20), &VAULT, &[ONE], &user2(), None, false),
        Err(VaultError::GuardsFailed { vault: VAULT })
    );
    assert_eq!(
        kernel.redeem(&at(user1(), 20), &VAULT, shares, &user2(), false),
        Err(VaultError::GuardsFailed { vault: VAULT })
    );
    assert_eq!(kernel.vault(&VAULT).unwrap().shares.balance_of(&user1()), shares);
}

/// Rejects fast redemptions once they have been applied
struct FastRedeemAudit;

impl GuardEngine for FastRedeemAudit {
    fn run_guards(&self, _request: &RequestContext) -> VaultResult<()> {
        Ok(())
    }

    fn run_post_guards(&self, request: &RequestContext) -> VaultResult<()> {
        if request.request_type == RequestType::FastRedeem {
            return Err(VaultError::GuardsFailed { vault: request.vault });
        }
        Ok(())
    }
}

#[test]
fn test_post_guards_roll_back_request() {
    let (mut kernel, group) = kernel_with(FastRedeemAudit);
    create_vault(&mut kernel, group, vec![LENDING_A, LENDING_B], SmartVaultFees::default());
    let shares = invest(&mut kernel, group, user1(), 1_000 * ONE, 10);
    let held = kernel.registry().share_balance(&LENDING_A, &VAULT).unwrap();
    let events = kernel.events().len();

    let guards = [SlippageGuard::redeem_any(), SlippageGuard::redeem_any()];
    assert_eq!(
        kernel.redeem_fast(&at(user1(), 20), &VAULT, shares / 2, &guards),
        Err(VaultError::GuardsFailed { vault: VAULT })
    );
    assert_eq!(kernel.vault(&VAULT).unwrap().shares.balance_of(&user1()), shares);
    assert_eq!(kernel.registry().share_balance(&LENDING_A, &VAULT).unwrap(), held);
    assert_eq!(kernel.ledger().paid_out(&user1(), &USDC), 0);
    assert_eq!(kernel.events().len(), events);

    // Other request types pass the post-request guards
    kernel.redeem(&at(user1(), 21), &VAULT, shares / 2, &user1(), false).unwrap();
    assert_eq!(kernel.vault(&VAULT).unwrap().shares.balance_of(&user1()), shares - shares / 2);
}

#[test]
fn test_receipt_transfer_moves_claim() {
    let (mut kernel, group) = lending_vault();
    let receipt = kernel
        .deposit(&at(user1(), 10), &VAULT, &[100 * ONE], &user1(), None, true)
        .unwrap();
    dhw(&mut kernel, group, &[LENDING_A, LENDING_B], 11);
    kernel.sync_smart_vault(&at(user1(), 12), &VAULT).unwrap();

    kernel
        .transfer_receipt(&at(user1(), 13), &VAULT, receipt, &user2(), NFT_MINTED_SHARES)
        .unwrap();
    assert!(kernel
        .claim_smart_vault_tokens(&at(user1(), 14), &VAULT, &[receipt], &[NFT_MINTED_SHARES])
        .is_err());
    let shares = kernel
        .claim_smart_vault_tokens(&at(user2(), 14), &VAULT, &[receipt], &[NFT_MINTED_SHARES])
        .unwrap();
    assert_eq!(kernel.vault(&VAULT).unwrap().shares.balance_of(&user2()), shares);
}

// ============ Vault and Strategy Lifecycle ============

#[test]
fn test_create_vault_validation() {
    let (mut kernel, group) = lending_vault();
    let admin = at(ADMIN, 0);
    let params = |id: VaultId, strategies: Vec<StrategyId>, allocation: Vec<u128>| VaultParams {
        id,
        asset_group_id: group,
        strategies,
        allocation,
        fees: SmartVaultFees::default(),
        fee_recipient: FEE_RECIPIENT,
    };

    assert_eq!(
        kernel.create_vault(&admin, params(VAULT, vec![LENDING_A], vec![100_00])),
        Err(VaultError::SmartVaultAlreadyRegistered { vault: VAULT })
    );
    assert_eq!(
        kernel.create_vault(&admin, params([0x72; 32], vec![], vec![])),
        Err(VaultError::NoStrategies)
    );
    assert!(matches!(
        kernel.create_vault(&admin, params([0x72; 32], vec![LENDING_A, LENDING_A], vec![50_00, 50_00])),
        Err(VaultError::InvalidInput { .. })
    ));
    assert!(matches!(
        kernel.create_vault(&admin, params([0x72; 32], vec![LENDING_A, LENDING_B], vec![50_00, 40_00])),
        Err(VaultError::InvalidAllocation { .. })
    ));

    let mut fees = SmartVaultFees::default();
    fees.performance_fee_pct = PERFORMANCE_FEE_MAX + 1;
    let mut too_expensive = params([0x72; 32], vec![LENDING_A], vec![100_00]);
    too_expensive.fees = fees;
    assert!(matches!(
        kernel.create_vault(&admin, too_expensive),
        Err(VaultError::FeeTooLarge { .. })
    ));
}

#[test]
fn test_remove_strategy_ghosts_vaults() {
    let (mut kernel, group) = lending_vault();
    invest(&mut kernel, group, user1(), 1_000 * ONE, 10);

    let affected = kernel.remove_strategy(&at(ADMIN, 20), &LENDING_B).unwrap();
    assert_eq!(affected, 1);
    let vault = kernel.vault(&VAULT).unwrap();
    assert_eq!(vault.strategies, vec![LENDING_A, GHOST_STRATEGY]);
    assert_eq!(vault.allocation[1], 0);

    // Removed strategies cannot back new vaults
    assert!(kernel
        .create_vault(
            &at(ADMIN, 21),
            VaultParams {
                id: [0x72; 32],
                asset_group_id: group,
                strategies: vec![LENDING_B],
                allocation: vec![100_00],
                fees: SmartVaultFees::default(),
                fee_recipient: FEE_RECIPIENT,
            },
        )
        .is_err());
    assert_eq!(kernel.events().filter_by_type(EventType::StrategyRemoved).len(), 1);
}

#[test]
fn test_emergency_withdraw_then_remove() {
    let (mut kernel, group) = kernel();
    create_vault(&mut kernel, group, vec![STAKING], SmartVaultFees::default());
    kernel
        .deposit(&at(user1(), 10), &VAULT, &[500 * ONE], &user1(), None, true)
        .unwrap();
    dhw(&mut kernel, group, &[STAKING], 11);

    let admin = at(ADMIN, 20);
    let recovery: Address = [0xEE; 32];
    kernel
        .emergency_withdraw(&admin, &[STAKING], &[SlippageGuard::redeem_any()], &recovery)
        .unwrap();
    assert_eq!(kernel.ledger().paid_out(&recovery, &USDC), 0);
    kernel
        .emergency_withdraw(
            &at(ADMIN, 20 + COOLDOWN),
            &[STAKING],
            &[SlippageGuard::redeem_any()],
            &recovery,
        )
        .unwrap();
    assert_eq!(kernel.ledger().paid_out(&recovery, &USDC), 500 * ONE);

    assert_eq!(kernel.remove_strategy(&admin, &STAKING).unwrap(), 1);
    assert_eq!(kernel.events().filter_by_type(EventType::EmergencyWithdrawal).len(), 2);
}

#[test]
fn test_emergency_withdraw_sweeps_flushed_deposits() {
    let (mut kernel, group) = lending_vault();
    invest(&mut kernel, group, user1(), 1_000 * ONE, 10);
    let deposit = kernel
        .deposit(&at(user2(), 20), &VAULT, &[500 * ONE], &user2(), None, true)
        .unwrap();

    let recovery: Address = [0xEE; 32];
    kernel
        .emergency_withdraw(&at(ADMIN, 21), &[LENDING_A], &[SlippageGuard::redeem_any()], &recovery)
        .unwrap();
    // 600 position plus the 300 flushed into the strategy
    assert_eq!(kernel.ledger().paid_out(&recovery, &USDC), 900 * ONE);
    assert_eq!(kernel.registry().strategy(&LENDING_A).unwrap().pending_deposits, vec![0]);

    kernel.remove_strategy(&at(ADMIN, 22), &LENDING_A).unwrap();
    dhw(&mut kernel, group, &[LENDING_B], 23);
    let synced = kernel.sync_smart_vault(&at(user2(), 24), &VAULT).unwrap();
    assert_eq!(synced[0].deposits.deposit_value, 200 * ONE);
    kernel
        .claim_smart_vault_tokens(&at(user2(), 24), &VAULT, &[deposit], &[NFT_MINTED_SHARES])
        .unwrap();
    assert_eq!(kernel.ledger().balance_of(&USDC), 0);
}

#[test]
fn test_management_fee_minted_at_sync() {
    let (mut kernel, group) = kernel();
    let fees = SmartVaultFees {
        management_fee_pct: 2_00,
        ..SmartVaultFees::default()
    };
    create_vault(&mut kernel, group, vec![LENDING_A, LENDING_B], fees);
    let shares = invest(&mut kernel, group, user1(), 1_000 * ONE, 0);

    let year = yieldvault_common::constants::vault_fees::SECONDS_IN_YEAR as u64;
    kernel
        .deposit(&at(user2(), year), &VAULT, &[ONE], &user2(), None, true)
        .unwrap();
    dhw(&mut kernel, group, &[LENDING_A, LENDING_B], year + 1);
    let synced = kernel.sync_smart_vault(&at(user2(), year + 2), &VAULT).unwrap();
    assert!(synced[0].deposits.management_fee_shares > 0);
    assert!(synced[0].deposits.management_fee_shares <= shares / 50);
    assert_eq!(
        kernel.vault(&VAULT).unwrap().shares.balance_of(&FEE_RECIPIENT),
        synced[0].deposits.management_fee_shares
    );
}

#[test]
fn test_event_digest_is_deterministic() {
    let run = || {
        let (mut kernel, group) = lending_vault();
        invest(&mut kernel, group, user1(), 1_000 * ONE, 10);
        kernel.events().digest()
    };
    assert_eq!(run(), run());
}
