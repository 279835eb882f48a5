//! Leveraged Swap Manager CLI
//!
//! Planning against a live Aave V2 deployment over JSON-RPC, plus an
//! end-to-end scenario on the in-memory simulated market.
//! Features:
//! - Token eligibility and account aggregates
//! - Swap and repay plans with fees, slippage bounds and projected health factor
//! - Simulated execution of a leveraged swap followed by a partial repay

use std::path::PathBuf;
use std::sync::Arc;

use alloy::primitives::{Address, U256};
use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use leverage_chain::u256_math::WAD;
use leverage_chain::{
    standard_reserve, AaveV2Reader, InterestRateMode, LendingPool, MarketBuilder,
    ReserveDataProvider, SimulatedMarket, TokenLedger,
};
use leverage_core::{
    parse_rate_mode, AssetPosition, DeploymentConfig, DeploymentContracts, LeveragedSwapManager,
    ManagerConfig, ManagerContext, ManagerSettings, RepayOutcome, RepayPlan, RepayPlanner,
    RepayRequest, SwapOutcome, SwapPlan, SwapPlanner, SwapRequest, TokenRegistry, Valuation,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Leveraged swap manager for Aave V2 markets")]
struct Cli {
    /// Emit logs as JSON
    #[arg(long, default_value_t = false)]
    json_logs: bool,

    /// Manager config file (TOML); defaults to the LEVERAGE_PROFILE profile
    #[arg(long, env = "LEVERAGE_CONFIG")]
    config: Option<PathBuf>,

    /// Deployment file (TOML); overrides the individual chain flags
    #[arg(long, env = "LEVERAGE_DEPLOYMENT")]
    deployment: Option<PathBuf>,

    #[command(flatten)]
    chain: ChainArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct ChainArgs {
    #[arg(long, env = "RPC_URL")]
    rpc_url: Option<String>,

    #[arg(long, env = "DATA_PROVIDER")]
    data_provider: Option<Address>,

    #[arg(long, env = "LENDING_POOL")]
    lending_pool: Option<Address>,

    #[arg(long, env = "PRICE_ORACLE")]
    price_oracle: Option<Address>,

    #[arg(long, env = "NATIVE_TOKEN")]
    native_token: Option<Address>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Eligibility and risk parameters of a reserve
    TokenInfo { token: Address },

    /// Account aggregates in the reference currency
    Account { address: Address },

    /// Every reserve the account supplies or owes
    Positions { address: Address },

    /// Plan a leveraged swap
    PlanSwap {
        #[arg(long)]
        account: Address,
        /// Token borrowed
        #[arg(long)]
        target: Address,
        /// Token bought and deposited
        #[arg(long)]
        pair: Address,
        /// Loan amount in base units
        #[arg(long)]
        amount: U256,
        #[arg(long, default_value_t = 0)]
        slippage_bps: u16,
        /// 1 = stable, 2 = variable
        #[arg(long, default_value_t = 2)]
        rate_mode: u8,
        #[arg(long, default_value_t = false)]
        separate_fee: bool,
    },

    /// Plan a deleveraging repay
    PlanRepay {
        #[arg(long)]
        account: Address,
        /// Debt token
        #[arg(long)]
        target: Address,
        #[arg(long)]
        repay_amount: U256,
        /// Collateral leg as `address:amount`; repeatable
        #[arg(long = "asset", required = true)]
        assets: Vec<String>,
        #[arg(long, default_value_t = 0)]
        slippage_bps: u16,
        #[arg(long, default_value_t = 2)]
        rate_mode: u8,
        #[arg(long, default_value_t = false)]
        separate_fee: bool,
    },

    /// Run a swap and a partial repay on the simulated market
    Simulate {
        /// Loan in whole DAI
        #[arg(long, default_value_t = 50)]
        loan: u64,
        #[arg(long, default_value_t = 200)]
        slippage_bps: u16,
        /// Router output haircut versus the oracle
        #[arg(long, default_value_t = 0)]
        haircut_bps: u16,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let config = match &cli.config {
        Some(path) => ManagerConfig::from_file(path)?,
        None => ManagerConfig::from_env(),
    };
    config.log_config();

    match cli.command {
        Command::Simulate {
            loan,
            slippage_bps,
            haircut_bps,
        } => {
            let report = simulate(config, loan, slippage_bps, haircut_bps).await?;
            print_json(&report)
        }
        command => {
            let deployment = load_deployment(cli.deployment.as_deref(), cli.chain)?;
            run_live(command, &deployment, &config).await
        }
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,leverage_core=debug,leverage_chain=debug"));
    let registry = tracing_subscriber::registry().with(filter);
    // stdout carries command output
    if json {
        registry.with(fmt::layer().json().with_writer(std::io::stderr)).init();
    } else {
        registry.with(fmt::layer().with_writer(std::io::stderr)).init();
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn load_deployment(path: Option<&std::path::Path>, chain: ChainArgs) -> Result<DeploymentConfig> {
    if let Some(path) = path {
        return DeploymentConfig::from_file(path);
    }

    let missing = |flag: &str| format!("missing --{flag} (or set a deployment file)");
    Ok(DeploymentConfig {
        name: "aave-v2".to_string(),
        rpc_url: chain.rpc_url.with_context(|| missing("rpc-url"))?,
        contracts: DeploymentContracts {
            data_provider: chain.data_provider.with_context(|| missing("data-provider"))?,
            lending_pool: chain.lending_pool.with_context(|| missing("lending-pool"))?,
            price_oracle: chain.price_oracle.with_context(|| missing("price-oracle"))?,
            native_token: chain.native_token.with_context(|| missing("native-token"))?,
        },
    })
}

/// Parse an `address:amount` collateral leg.
fn parse_leg(raw: &str) -> Result<(Address, U256)> {
    let Some((address, amount)) = raw.split_once(':') else {
        bail!("collateral leg {raw:?} is not address:amount");
    };
    let address: Address = address
        .parse()
        .with_context(|| format!("invalid address in leg {raw:?}"))?;
    let amount: U256 = amount
        .parse()
        .with_context(|| format!("invalid amount in leg {raw:?}"))?;
    Ok((address, amount))
}

fn rate_mode(mode: u8) -> Result<InterestRateMode> {
    Ok(parse_rate_mode(mode)?)
}

async fn run_live(command: Command, deployment: &DeploymentConfig, config: &ManagerConfig) -> Result<()> {
    let reader = Arc::new(AaveV2Reader::new(deployment.aave_config())?);
    info!(
        deployment = %deployment.name,
        data_provider = %deployment.contracts.data_provider,
        price_oracle = %deployment.contracts.price_oracle,
        "Aave V2 reader initialized"
    );

    let registry = TokenRegistry::new(reader.clone());
    let valuation = Valuation::new(reader.clone(), reader.clone());
    let native = deployment.contracts.native_token;

    match command {
        Command::TokenInfo { token } => print_json(&registry.get_token_info(token).await?),
        Command::Account { address } => print_json(&valuation.user_account_data(address).await?),
        Command::Positions { address } => {
            let mut positions = Vec::new();
            for asset in registry.all_reserves().await? {
                let data = reader.user_reserve_data(asset, address).await?;
                if !data.is_empty() {
                    positions.push(AssetPosition::new(registry.get_token_info(asset).await?, &data));
                }
            }
            print_json(&positions)
        }
        Command::PlanSwap {
            account,
            target,
            pair,
            amount,
            slippage_bps,
            rate_mode: mode,
            separate_fee,
        } => {
            let mut request = SwapRequest::new(
                registry.get_token_info(target).await?,
                registry.get_token_info(pair).await?,
                amount,
            )
            .with_rate_mode(rate_mode(mode)?)
            .with_slippage_bps(slippage_bps);
            if separate_fee {
                request = request.with_separate_fee();
            }
            let planner = SwapPlanner::new(registry, valuation, native, config);
            print_json(&planner.check_and_calculate_swap_vars(account, &request).await?)
        }
        Command::PlanRepay {
            account,
            target,
            repay_amount,
            assets,
            slippage_bps,
            rate_mode: mode,
            separate_fee,
        } => {
            let mut request = RepayRequest::new(registry.get_token_info(target).await?, repay_amount)
                .with_rate_mode(rate_mode(mode)?)
                .with_slippage_bps(slippage_bps);
            for raw in &assets {
                let (asset, amount) = parse_leg(raw)?;
                request = request.with_collateral(registry.get_token_info(asset).await?, amount);
            }
            if separate_fee {
                request = request.with_separate_fee();
            }
            let planner = RepayPlanner::new(registry, valuation, native, config);
            print_json(&planner.check_and_calculate_repay_vars(account, &request).await?)
        }
        Command::Simulate { .. } => bail!("simulate runs without a deployment"),
    }
}

/// Everything the `simulate` command prints.
#[derive(Debug, Serialize)]
struct SimulationReport {
    swap_plan: SwapPlan,
    swap_outcome: SwapOutcome,
    repay_plan: RepayPlan,
    repay_outcome: RepayOutcome,
    positions: Vec<AssetPosition>,
}

mod demo {
    use alloy::primitives::Address;

    pub fn dai() -> Address {
        Address::repeat_byte(0xda)
    }

    pub fn usdc() -> Address {
        Address::repeat_byte(0xc0)
    }

    pub fn weth() -> Address {
        Address::repeat_byte(0xee)
    }

    pub fn account() -> Address {
        Address::repeat_byte(0x01)
    }

    pub fn manager_address() -> Address {
        Address::repeat_byte(0x5a)
    }

    pub fn treasury() -> Address {
        Address::repeat_byte(0xfe)
    }
}

/// Supply 10 WETH, lever into USDC with a DAI loan, then unwind half of the
/// USDC against the debt.
async fn simulate(
    config: ManagerConfig,
    loan: u64,
    slippage_bps: u16,
    haircut_bps: u16,
) -> Result<SimulationReport> {
    use demo::*;

    let stable_price = U256::from(500_000_000_000_000u64);
    let market: Arc<SimulatedMarket> = Arc::new(
        MarketBuilder::new()
            .with_reserve(dai(), standard_reserve(18, 7500, 8000), stable_price)
            .with_reserve(usdc(), standard_reserve(6, 8000, 8500), stable_price)
            .with_reserve(weth(), standard_reserve(18, 8000, 8250), WAD)
            .with_router_haircut_bps(haircut_bps)
            .build(),
    );
    let settings = ManagerSettings {
        manager: manager_address(),
        native_token: weth(),
        fee_recipient: treasury(),
    };
    let manager = LeveragedSwapManager::new();
    manager.initialize(ManagerContext::simulated(market.clone(), settings, config))?;

    let supplied = U256::from(10u64) * WAD;
    market.fund(weth(), account(), supplied);
    market
        .approve(weth(), account(), market.address(), supplied)
        .await?;
    market.deposit(account(), weth(), supplied, account()).await?;

    let loan = U256::from(loan) * WAD;
    market.approve_delegation(dai(), InterestRateMode::Variable, account(), manager_address(), loan)?;
    let swap_request = SwapRequest::new(
        manager.get_token_info(dai()).await?,
        manager.get_token_info(usdc()).await?,
        loan,
    )
    .with_slippage_bps(slippage_bps);
    let swap_plan = manager
        .check_and_calculate_swap_vars(account(), &swap_request)
        .await?;
    let swap_outcome = manager
        .swap_preapproved_assets(account(), &swap_plan, None)
        .await
        .context("simulated swap failed")?;

    let a_usdc = market.tokens_of(usdc())?.a_token;
    let half = market.balance(a_usdc, account()) / U256::from(2u64);
    market.approve(a_usdc, account(), manager_address(), half).await?;
    let debt = market
        .user_reserve_data(dai(), account())
        .await?
        .current_variable_debt;
    let repay_request = RepayRequest::new(manager.get_token_info(dai()).await?, debt)
        .with_collateral(manager.get_token_info(usdc()).await?, half)
        .with_slippage_bps(slippage_bps);
    let repay_plan = manager
        .check_and_calculate_repay_vars(account(), &repay_request)
        .await?;
    let repay_outcome = manager
        .repay_debt(account(), &repay_plan, None)
        .await
        .context("simulated repay failed")?;

    Ok(SimulationReport {
        positions: manager.asset_positions(account()).await?,
        swap_plan,
        swap_outcome,
        repay_plan,
        repay_outcome,
    })
}
