//! Flashloan Execution Planner.
//!
//! Wraps the three swap instructions of a route between a single borrow and
//! its repay:
//!
//! ```text
//! [compute budget] -> borrow(loan) -> swap 1 -> swap 2 -> swap 3 -> repay(loan)
//! ```
//!
//! Every swap is built from the amounts quoted for *that* leg. Building fails
//! fast; no partial transaction is ever returned.

use borsh::BorshSerialize;
use itertools::Itertools;
use solana_sdk::compute_budget::ComputeBudgetInstruction;
use solana_sdk::instruction::{AccountMeta, Instruction};
use solana_sdk::pubkey;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::sysvar;
use solana_sdk::transaction::Transaction;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::dex_interface::LegQuote;
use crate::error::ExecutionError;
use crate::pool::PoolVariant;

pub const RAYDIUM_CPMM_PROGRAM_ID: Pubkey = pubkey!("CPMMoo8L3F4NbTegBCKVNunggL7H1ZpdTHKxQB5qKP1C");
pub const METEORA_DLMM_PROGRAM_ID: Pubkey = pubkey!("LBUZKhRxPF3XUpBCjp4YzTKgLccjZhTSDM9YuVaPwxo");
pub const RAYDIUM_CLMM_PROGRAM_ID: Pubkey = pubkey!("CAMMCzo5YL8w4VFF8KVHrK22GGUsp5VTaW7grrKgrWqK");
pub const ORCA_WHIRLPOOL_PROGRAM_ID: Pubkey = pubkey!("whirLbMiicVdio4qvUfM5KAg6Ct8VwpYzGff3uctyCc");
pub const ASSOCIATED_TOKEN_PROGRAM_ID: Pubkey = pubkey!("ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA8knL");

/// Anchor sighash of `swap_base_input`.
pub const SWAP_BASE_INPUT_DISCRIMINATOR: [u8; 8] = [143, 190, 90, 218, 196, 30, 51, 222];
/// Anchor sighash of `swap`.
pub const SWAP_DISCRIMINATOR: [u8; 8] = [248, 198, 158, 145, 225, 117, 135, 200];

/// Normalized DEX tag used to pick a swap instruction builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DexType {
    RaydiumCpmm,
    MeteoraDlmm,
    RaydiumClmm,
    OrcaWhirlpool,
}

impl DexType {
    /// Map a free-form dex/type tag (`"raydium-cpmm"`, `"Orca Whirlpool"`,
    /// `"dlmm"`, ...) to a `DexType`.
    pub fn normalize(tag: &str) -> Result<Self, ExecutionError> {
        let key: String = tag
            .trim()
            .to_lowercase()
            .chars()
            .map(|c| if c == '-' || c == ' ' { '_' } else { c })
            .collect();
        match key.as_str() {
            "cpmm" | "raydium_cpmm" | "raydium_cp" | "cp_swap" => Ok(DexType::RaydiumCpmm),
            "dlmm" | "meteora" | "meteora_dlmm" => Ok(DexType::MeteoraDlmm),
            "clmm" | "raydium_clmm" => Ok(DexType::RaydiumClmm),
            "whirlpool" | "whirlpools" | "orca" | "orca_whirlpool" => Ok(DexType::OrcaWhirlpool),
            _ => Err(ExecutionError::UnsupportedDex(tag.to_string())),
        }
    }

    pub fn from_variant(variant: PoolVariant) -> Self {
        match variant {
            PoolVariant::Cpmm => DexType::RaydiumCpmm,
            PoolVariant::Dlmm => DexType::MeteoraDlmm,
            PoolVariant::Clmm => DexType::RaydiumClmm,
            PoolVariant::Whirlpool => DexType::OrcaWhirlpool,
        }
    }

    /// Bin/tick-walking programs need the arrays captured at quote time.
    pub fn requires_routing_accounts(&self) -> bool {
        !matches!(self, DexType::RaydiumCpmm)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DexType::RaydiumCpmm => "raydium-cpmm",
            DexType::MeteoraDlmm => "meteora-dlmm",
            DexType::RaydiumClmm => "raydium-clmm",
            DexType::OrcaWhirlpool => "orca-whirlpool",
        }
    }
}

impl fmt::Display for DexType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One hop as the planner consumes it.
#[derive(Debug, Clone, PartialEq)]
pub struct FlashloanLeg {
    pub input_mint: Pubkey,
    pub output_mint: Pubkey,
    pub pool_address: Pubkey,
    pub amount_in_atomic: Option<u64>,
    pub min_out_atomic: Option<u64>,
    /// Quoted output, used to check the next leg's input.
    pub expected_out_atomic: Option<u64>,
    pub dex_type: String,
    pub routing_accounts: Vec<Pubkey>,
}

impl From<&LegQuote> for FlashloanLeg {
    fn from(leg: &LegQuote) -> Self {
        Self {
            input_mint: leg.input_mint,
            output_mint: leg.output_mint,
            pool_address: leg.pool_address,
            amount_in_atomic: Some(leg.quote.in_atomic),
            min_out_atomic: Some(leg.quote.min_out_atomic),
            expected_out_atomic: Some(leg.quote.out_atomic),
            dex_type: DexType::from_variant(leg.variant).as_str().to_string(),
            routing_accounts: leg.quote.routing_accounts.clone(),
        }
    }
}

/// Associated token account of `owner` for `mint`.
pub fn associated_token_address(owner: &Pubkey, mint: &Pubkey) -> Pubkey {
    Pubkey::find_program_address(
        &[owner.as_ref(), spl_token::id().as_ref(), mint.as_ref()],
        &ASSOCIATED_TOKEN_PROGRAM_ID,
    )
    .0
}

/// Builds the swap instruction for one leg.
pub trait SwapInstructionBuilder: Send + Sync {
    fn build(
        &self,
        payer: &Pubkey,
        leg: &FlashloanLeg,
        amount_in: u64,
        min_out: u64,
    ) -> Result<Instruction, String>;
}

#[derive(BorshSerialize)]
struct SwapArgs {
    amount_in: u64,
    minimum_amount_out: u64,
}

/// Anchor-style exact-in swap: 8-byte sighash followed by the borsh encoded
/// `(amount_in, minimum_amount_out)`.
///
/// Accounts: payer, pool, payer input ATA, payer output ATA, input mint,
/// output mint, token program, then the routing accounts.
#[derive(Debug, Clone, Copy)]
pub struct AnchorSwapBuilder {
    pub program_id: Pubkey,
    pub discriminator: [u8; 8],
}

impl AnchorSwapBuilder {
    pub fn for_dex(dex: DexType) -> Self {
        let (program_id, discriminator) = match dex {
            DexType::RaydiumCpmm => (RAYDIUM_CPMM_PROGRAM_ID, SWAP_BASE_INPUT_DISCRIMINATOR),
            DexType::MeteoraDlmm => (METEORA_DLMM_PROGRAM_ID, SWAP_DISCRIMINATOR),
            DexType::RaydiumClmm => (RAYDIUM_CLMM_PROGRAM_ID, SWAP_DISCRIMINATOR),
            DexType::OrcaWhirlpool => (ORCA_WHIRLPOOL_PROGRAM_ID, SWAP_DISCRIMINATOR),
        };
        Self {
            program_id,
            discriminator,
        }
    }
}

impl SwapInstructionBuilder for AnchorSwapBuilder {
    fn build(
        &self,
        payer: &Pubkey,
        leg: &FlashloanLeg,
        amount_in: u64,
        min_out: u64,
    ) -> Result<Instruction, String> {
        let args = SwapArgs {
            amount_in,
            minimum_amount_out: min_out,
        }
        .try_to_vec()
        .map_err(|e| e.to_string())?;

        let mut data = Vec::with_capacity(8 + args.len());
        data.extend_from_slice(&self.discriminator);
        data.extend_from_slice(&args);

        let mut accounts = vec![
            AccountMeta::new(*payer, true),
            AccountMeta::new(leg.pool_address, false),
            AccountMeta::new(associated_token_address(payer, &leg.input_mint), false),
            AccountMeta::new(associated_token_address(payer, &leg.output_mint), false),
            AccountMeta::new_readonly(leg.input_mint, false),
            AccountMeta::new_readonly(leg.output_mint, false),
            AccountMeta::new_readonly(spl_token::id(), false),
        ];
        accounts.extend(leg.routing_accounts.iter().map(|a| AccountMeta::new(*a, false)));

        Ok(Instruction {
            program_id: self.program_id,
            accounts,
            data,
        })
    }
}

/// Source of the borrow and repay instructions.
pub trait FlashloanProvider: Send + Sync {
    fn is_configured(&self) -> bool;

    fn borrow_instruction(
        &self,
        payer: &Pubkey,
        mint: &Pubkey,
        amount: u64,
    ) -> Result<Instruction, ExecutionError>;

    /// `borrow_index` is the position of the borrow instruction in the
    /// transaction.
    fn repay_instruction(
        &self,
        payer: &Pubkey,
        mint: &Pubkey,
        amount: u64,
        borrow_index: u8,
    ) -> Result<Instruction, ExecutionError>;
}

/// Reserve accounts of a token-lending flash loan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LendingAccounts {
    pub program_id: Pubkey,
    pub lending_market: Pubkey,
    pub reserve: Pubkey,
    pub liquidity_mint: Pubkey,
    pub liquidity_supply: Pubkey,
    pub fee_receiver: Pubkey,
    pub host_fee_receiver: Option<Pubkey>,
    pub borrow_tag: u8,
    pub repay_tag: u8,
}

/// Flash loans against a single token-lending reserve
/// (`FlashBorrowReserveLiquidity` / `FlashRepayReserveLiquidity`).
#[derive(Debug, Clone, Default)]
pub struct TokenLendingFlashloanProvider {
    accounts: Option<LendingAccounts>,
}

impl TokenLendingFlashloanProvider {
    pub fn new(accounts: LendingAccounts) -> Self {
        Self {
            accounts: Some(accounts),
        }
    }

    pub fn unconfigured() -> Self {
        Self::default()
    }

    fn accounts_for(&self, mint: &Pubkey) -> Result<&LendingAccounts, ExecutionError> {
        let accounts = self
            .accounts
            .as_ref()
            .ok_or(ExecutionError::FlashloanProviderUnconfigured)?;
        if accounts.liquidity_mint != *mint {
            return Err(ExecutionError::Flashloan(format!(
                "reserve lends {}, route borrows {}",
                accounts.liquidity_mint, mint
            )));
        }
        Ok(accounts)
    }
}

impl FlashloanProvider for TokenLendingFlashloanProvider {
    fn is_configured(&self) -> bool {
        self.accounts.is_some()
    }

    fn borrow_instruction(
        &self,
        payer: &Pubkey,
        mint: &Pubkey,
        amount: u64,
    ) -> Result<Instruction, ExecutionError> {
        let a = self.accounts_for(mint)?;
        let (market_authority, _) =
            Pubkey::find_program_address(&[a.lending_market.as_ref()], &a.program_id);

        let mut data = vec![a.borrow_tag];
        data.extend_from_slice(&amount.to_le_bytes());

        Ok(Instruction {
            program_id: a.program_id,
            accounts: vec![
                AccountMeta::new(a.liquidity_supply, false),
                AccountMeta::new(associated_token_address(payer, mint), false),
                AccountMeta::new(a.reserve, false),
                AccountMeta::new_readonly(a.lending_market, false),
                AccountMeta::new_readonly(market_authority, false),
                AccountMeta::new_readonly(sysvar::instructions::id(), false),
                AccountMeta::new_readonly(spl_token::id(), false),
            ],
            data,
        })
    }

    fn repay_instruction(
        &self,
        payer: &Pubkey,
        mint: &Pubkey,
        amount: u64,
        borrow_index: u8,
    ) -> Result<Instruction, ExecutionError> {
        let a = self.accounts_for(mint)?;

        let mut data = vec![a.repay_tag];
        data.extend_from_slice(&amount.to_le_bytes());
        data.push(borrow_index);

        Ok(Instruction {
            program_id: a.program_id,
            accounts: vec![
                AccountMeta::new(associated_token_address(payer, mint), false),
                AccountMeta::new(a.liquidity_supply, false),
                AccountMeta::new(a.fee_receiver, false),
                AccountMeta::new(a.host_fee_receiver.unwrap_or(a.fee_receiver), false),
                AccountMeta::new(a.reserve, false),
                AccountMeta::new_readonly(a.lending_market, false),
                AccountMeta::new_readonly(*payer, true),
                AccountMeta::new_readonly(sysvar::instructions::id(), false),
                AccountMeta::new_readonly(spl_token::id(), false),
            ],
            data,
        })
    }
}

/// Unsigned flashloan transaction plus every key that must sign it.
#[derive(Debug, Clone)]
pub struct PlannedTransaction {
    pub transaction: Transaction,
    /// Fee payer first.
    pub signers: Vec<Pubkey>,
}

pub struct FlashloanPlanner {
    provider: Arc<dyn FlashloanProvider>,
    builders: HashMap<DexType, Arc<dyn SwapInstructionBuilder>>,
    compute_unit_limit: Option<u32>,
    compute_unit_price: Option<u64>,
}

impl FlashloanPlanner {
    /// Planner with an `AnchorSwapBuilder` registered for every `DexType`.
    pub fn new(provider: Arc<dyn FlashloanProvider>) -> Self {
        let builders = [
            DexType::RaydiumCpmm,
            DexType::MeteoraDlmm,
            DexType::RaydiumClmm,
            DexType::OrcaWhirlpool,
        ]
        .into_iter()
        .map(|dex| {
            (
                dex,
                Arc::new(AnchorSwapBuilder::for_dex(dex)) as Arc<dyn SwapInstructionBuilder>,
            )
        })
        .collect();

        Self {
            provider,
            builders,
            compute_unit_limit: None,
            compute_unit_price: None,
        }
    }

    pub fn with_builder(mut self, dex: DexType, builder: Arc<dyn SwapInstructionBuilder>) -> Self {
        self.builders.insert(dex, builder);
        self
    }

    pub fn with_compute_budget(mut self, unit_limit: Option<u32>, unit_price: Option<u64>) -> Self {
        self.compute_unit_limit = unit_limit;
        self.compute_unit_price = unit_price;
        self
    }

    pub fn build_flashloan_tx(
        &self,
        payer: &Pubkey,
        loan_mint: &Pubkey,
        loan_amount_atomic: u64,
        legs: &[FlashloanLeg],
    ) -> Result<PlannedTransaction, ExecutionError> {
        if !self.provider.is_configured() {
            return Err(ExecutionError::FlashloanProviderUnconfigured);
        }
        if legs.len() != 3 {
            return Err(ExecutionError::LegCount(legs.len()));
        }
        check_mint_chain(loan_mint, legs)?;
        let amounts = check_leg_amounts(loan_amount_atomic, legs)?;

        let mut instructions = Vec::new();
        if let Some(limit) = self.compute_unit_limit {
            instructions.push(ComputeBudgetInstruction::set_compute_unit_limit(limit));
        }
        if let Some(price) = self.compute_unit_price {
            instructions.push(ComputeBudgetInstruction::set_compute_unit_price(price));
        }

        let borrow_index = u8::try_from(instructions.len())
            .map_err(|_| ExecutionError::Flashloan("too many instructions before borrow".into()))?;
        instructions.push(
            self.provider
                .borrow_instruction(payer, loan_mint, loan_amount_atomic)?,
        );

        for (i, (leg, (amount_in, min_out))) in legs.iter().zip(amounts).enumerate() {
            let n = i + 1;
            let dex = DexType::normalize(&leg.dex_type)?;
            if dex.requires_routing_accounts() && leg.routing_accounts.is_empty() {
                return Err(ExecutionError::MissingRoutingAccounts {
                    leg: n,
                    dex: dex.to_string(),
                });
            }
            let builder = self
                .builders
                .get(&dex)
                .ok_or_else(|| ExecutionError::UnsupportedDex(leg.dex_type.clone()))?;
            let ix = builder
                .build(payer, leg, amount_in, min_out)
                .map_err(|detail| ExecutionError::InstructionBuild { leg: n, detail })?;
            debug!(leg = n, dex = %dex, pool = %leg.pool_address, amount_in, min_out, "swap instruction built");
            instructions.push(ix);
        }

        instructions.push(self.provider.repay_instruction(
            payer,
            loan_mint,
            loan_amount_atomic,
            borrow_index,
        )?);

        let signers: Vec<Pubkey> = std::iter::once(*payer)
            .chain(
                instructions
                    .iter()
                    .flat_map(|ix| ix.accounts.iter())
                    .filter(|meta| meta.is_signer)
                    .map(|meta| meta.pubkey),
            )
            .unique()
            .collect();

        debug!(
            instructions = instructions.len(),
            signers = signers.len(),
            loan = loan_amount_atomic,
            "flashloan transaction planned"
        );

        Ok(PlannedTransaction {
            transaction: Transaction::new_with_payer(&instructions, Some(payer)),
            signers,
        })
    }
}

fn check_mint_chain(loan_mint: &Pubkey, legs: &[FlashloanLeg]) -> Result<(), ExecutionError> {
    if legs[0].input_mint != *loan_mint {
        return Err(ExecutionError::BrokenMintChain {
            leg: 1,
            detail: format!("input {} is not the loan mint {}", legs[0].input_mint, loan_mint),
        });
    }
    for (i, pair) in legs.windows(2).enumerate() {
        if pair[0].output_mint != pair[1].input_mint {
            return Err(ExecutionError::BrokenMintChain {
                leg: i + 2,
                detail: format!(
                    "input {} does not follow previous output {}",
                    pair[1].input_mint, pair[0].output_mint
                ),
            });
        }
    }
    let last = &legs[legs.len() - 1];
    if last.output_mint != *loan_mint {
        return Err(ExecutionError::BrokenMintChain {
            leg: legs.len(),
            detail: format!("output {} does not return to the loan mint", last.output_mint),
        });
    }
    Ok(())
}

/// `(amount_in, min_out)` per leg, each the amount quoted for that leg.
fn check_leg_amounts(loan_amount: u64, legs: &[FlashloanLeg]) -> Result<Vec<(u64, u64)>, ExecutionError> {
    let mut amounts = Vec::with_capacity(legs.len());
    for (i, leg) in legs.iter().enumerate() {
        let n = i + 1;
        let amount_in = leg.amount_in_atomic.ok_or(ExecutionError::MissingLegAmount {
            leg: n,
            field: "amountInAtomic",
        })?;
        let min_out = leg.min_out_atomic.ok_or(ExecutionError::MissingLegAmount {
            leg: n,
            field: "minOutAtomic",
        })?;

        if i == 0 {
            if amount_in != loan_amount {
                return Err(ExecutionError::LoanAmountMismatch {
                    expected: loan_amount,
                    actual: amount_in,
                });
            }
        } else {
            let quoted = legs[i - 1].expected_out_atomic;
            if amount_in == loan_amount && quoted != Some(loan_amount) {
                return Err(ExecutionError::ReusedLoanAmount { leg: n });
            }
            if let Some(expected) = quoted.filter(|&out| out != amount_in) {
                return Err(ExecutionError::LegAmountMismatch {
                    leg: n,
                    expected,
                    actual: amount_in,
                });
            }
        }
        amounts.push((amount_in, min_out));
    }
    Ok(amounts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dex_type_normalization() {
        assert_eq!(DexType::normalize("Raydium-CPMM").unwrap(), DexType::RaydiumCpmm);
        assert_eq!(DexType::normalize("Orca Whirlpool").unwrap(), DexType::OrcaWhirlpool);
        assert_eq!(DexType::normalize("meteora_dlmm").unwrap(), DexType::MeteoraDlmm);
        assert_eq!(DexType::normalize(" clmm ").unwrap(), DexType::RaydiumClmm);
        assert_eq!(
            DexType::normalize("phoenix").unwrap_err().reason(),
            "unsupported-dex"
        );
    }

    #[test]
    fn test_anchor_swap_data_layout() {
        let payer = Pubkey::new_unique();
        let leg = FlashloanLeg {
            input_mint: Pubkey::new_unique(),
            output_mint: Pubkey::new_unique(),
            pool_address: Pubkey::new_unique(),
            amount_in_atomic: Some(1_000),
            min_out_atomic: Some(990),
            expected_out_atomic: Some(995),
            dex_type: "cpmm".into(),
            routing_accounts: vec![],
        };
        let ix = AnchorSwapBuilder::for_dex(DexType::RaydiumCpmm)
            .build(&payer, &leg, 1_000, 990)
            .unwrap();

        assert_eq!(ix.program_id, RAYDIUM_CPMM_PROGRAM_ID);
        assert_eq!(&ix.data[..8], &SWAP_BASE_INPUT_DISCRIMINATOR);
        assert_eq!(&ix.data[8..16], &1_000u64.to_le_bytes());
        assert_eq!(&ix.data[16..24], &990u64.to_le_bytes());
        assert_eq!(ix.accounts[0].pubkey, payer);
        assert!(ix.accounts[0].is_signer);
        assert_eq!(
            ix.accounts[2].pubkey,
            associated_token_address(&payer, &leg.input_mint)
        );
    }

    #[test]
    fn test_unconfigured_provider() {
        let provider = TokenLendingFlashloanProvider::unconfigured();
        assert!(!provider.is_configured());
        let err = provider
            .borrow_instruction(&Pubkey::new_unique(), &Pubkey::new_unique(), 1)
            .unwrap_err();
        assert_eq!(err, ExecutionError::FlashloanProviderUnconfigured);
    }
}
