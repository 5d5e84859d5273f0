//! Outbound messages and the views the engine renders

use super::action::{Action, AMOUNT_PRESETS, SLIPPAGE_PRESETS};
use crate::custody::{GasMode, UserSettings};
use crate::execution::{Direction, ExecutionReport, PendingTrade};
use crate::market::{Quote, RiskReport, TokenSnapshot};
use crate::portfolio::PortfolioValuation;
use crate::tokens::{abbreviate, abbreviate_opt, to_decimal, NATIVE_DECIMALS};
use rust_decimal::Decimal;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub label: String,
    pub action: Action,
}

impl Button {
    pub fn new(label: impl Into<String>, action: Action) -> Self {
        Self {
            label: label.into(),
            action,
        }
    }
}

/// Text plus an optional grid of buttons
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub keyboard: Vec<Vec<Button>>,
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            keyboard: Vec::new(),
        }
    }

    pub fn with_keyboard(mut self, keyboard: Vec<Vec<Button>>) -> Self {
        self.keyboard = keyboard;
        self
    }

    pub fn with_main_menu(self, has_wallet: bool) -> Self {
        self.with_keyboard(main_menu(has_wallet))
    }

    /// Every action offered by this reply, row by row
    pub fn actions(&self) -> impl Iterator<Item = Action> + '_ {
        self.keyboard.iter().flatten().map(|b| b.action)
    }
}

pub fn main_menu(has_wallet: bool) -> Vec<Vec<Button>> {
    if has_wallet {
        vec![
            vec![
                Button::new("Wallet", Action::Wallet),
                Button::new("Trade", Action::TradeMenu),
            ],
            vec![
                Button::new("Portfolio", Action::Portfolio),
                Button::new("Settings", Action::Settings),
            ],
            vec![
                Button::new("Help", Action::Help),
                Button::new("Disconnect", Action::Disconnect),
            ],
        ]
    } else {
        vec![
            vec![Button::new("Connect Wallet", Action::ConnectWallet)],
            vec![Button::new("Help", Action::Help)],
        ]
    }
}

pub fn trade_menu() -> Reply {
    Reply::text("Choose trade type:").with_keyboard(vec![
        vec![
            Button::new("Buy (BNB -> Token)", Action::StartFlow(Direction::Buy)),
            Button::new("Sell (Token -> BNB)", Action::StartFlow(Direction::Sell)),
        ],
        vec![Button::new("Back", Action::MainMenu)],
    ])
}

pub fn help(has_wallet: bool) -> Reply {
    Reply::text(
        "Swap desk\n\n\
         1. Connect a wallet (use a fresh one)\n\
         2. Trade -> Buy or Sell\n\
         3. Paste the token contract address\n\
         4. Review price, market cap, holders and risk\n\
         5. Proceed, pick a preset or type an amount, then confirm",
    )
    .with_main_menu(has_wallet)
}

/// Settings view, rendered after every settings change
pub fn settings(current: &UserSettings) -> Reply {
    let text = format!(
        "Settings\n\nSlippage: {}%\nGas mode: {}\n\nAdjust below:",
        current.slippage.percent().normalize(),
        current.gas_mode.as_str()
    );
    let mark = |selected: bool, label: String| {
        if selected {
            format!("[{}]", label)
        } else {
            label
        }
    };

    let slippage_row: Vec<Button> = SLIPPAGE_PRESETS
        .iter()
        .map(|p| {
            let selected = u16::from(*p) * 100 == current.slippage.bps();
            Button::new(mark(selected, format!("Slippage {}%", p)), Action::SetSlippage(*p))
        })
        .collect();
    let gas_row: Vec<Button> = GasMode::ALL
        .iter()
        .map(|mode| {
            Button::new(
                mark(*mode == current.gas_mode, format!("Gas: {}", mode.as_str())),
                Action::SetGas(*mode),
            )
        })
        .collect();

    Reply::text(text).with_keyboard(vec![
        slippage_row,
        gas_row,
        vec![Button::new("Back", Action::MainMenu)],
    ])
}

fn review_keyboard(direction: Direction) -> Vec<Vec<Button>> {
    vec![
        vec![
            Button::new("Refresh", Action::Refresh(direction)),
            Button::new("Risk", Action::Risk(direction)),
        ],
        vec![
            Button::new("Proceed", Action::Proceed(direction)),
            Button::new("Cancel", Action::Cancel),
        ],
    ]
}

fn fee_line(snapshot: &TokenSnapshot) -> String {
    if snapshot.fee_percent > Decimal::ZERO {
        let receiver = snapshot
            .fee_receiver
            .map(|r| r.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        format!("\nToken fee: ~{:.2}% (to: {})", snapshot.fee_percent, receiver)
    } else {
        String::new()
    }
}

pub fn risk_text(report: &RiskReport) -> String {
    match report {
        RiskReport::Assessed {
            loss_percent,
            level,
            ..
        } => format!(
            "Round-trip loss: {:.2}% ({} risk)\nAdvisory only, taxes can change at any time.",
            loss_percent,
            level.label()
        ),
        RiskReport::Failed(reason) => format!("Risk check failed: {}", reason),
    }
}

/// Token review view
pub fn overview(
    direction: Direction,
    snapshot: &TokenSnapshot,
    token_balance: Option<Decimal>,
    risk: Option<&RiskReport>,
) -> Reply {
    let supply = to_decimal(snapshot.total_supply, snapshot.decimals);
    let mut text = format!(
        "TOKEN OVERVIEW ({})\n\nSymbol: {}\nAddress:\n{}\n\nPrice: {} USD\nMarket Cap: {} USD\nTotal Supply: {} {}\nHolders: {}",
        direction.label(),
        snapshot.symbol,
        snapshot.address,
        abbreviate_opt(snapshot.price_usd),
        abbreviate_opt(snapshot.market_cap_usd),
        abbreviate_opt(supply),
        snapshot.symbol,
        snapshot
            .holders
            .map(|h| h.to_string())
            .unwrap_or_else(|| "Unknown".to_string()),
    );
    if let Some(balance) = token_balance {
        text.push_str(&format!("\nYour balance: {} {}", abbreviate(balance), snapshot.symbol));
    }
    text.push_str(&fee_line(snapshot));
    if let Some(report) = risk {
        text.push_str("\n\nRisk check:\n");
        text.push_str(&risk_text(report));
    }
    text.push_str("\n\nRefresh, check risk, or proceed.");

    Reply::text(text).with_keyboard(review_keyboard(direction))
}

/// Amount entry prompt with percentage presets
pub fn amount_prompt(direction: Direction, symbol: &str, token_balance: Option<Decimal>) -> Reply {
    let text = match direction {
        Direction::Buy => "Enter BNB amount to BUY (e.g. 0.01) or use a preset:".to_string(),
        Direction::Sell => {
            let mut text = format!("Enter {} amount to SELL or use a preset:", symbol);
            if let Some(balance) = token_balance {
                text.push_str(&format!("\nYour balance: {} {}", abbreviate(balance), symbol));
            }
            text
        }
    };
    let presets: Vec<Button> = AMOUNT_PRESETS
        .iter()
        .map(|p| Button::new(format!("{}%", p), Action::Preset(direction, *p)))
        .collect();
    Reply::text(text).with_keyboard(vec![presets, vec![Button::new("Cancel", Action::Cancel)]])
}

/// Final confirmation before anything is signed
pub fn confirmation(trade: &PendingTrade, quote: &Quote, settings: &UserSettings, snapshot: &TokenSnapshot) -> Reply {
    let (in_decimals, in_symbol, out_decimals, out_symbol) = match trade.direction {
        Direction::Buy => (NATIVE_DECIMALS, "BNB", trade.decimals, trade.symbol.as_str()),
        Direction::Sell => (trade.decimals, trade.symbol.as_str(), NATIVE_DECIMALS, "BNB"),
    };
    let human = |raw, decimals| abbreviate_opt(to_decimal(raw, decimals));

    let text = format!(
        "{} CONFIRMATION\n\nToken: {}\nCA: {}\nAmount: {} {}\nEst. received (router quote): {} {}\nMinimum received ({}% slippage): {} {}{}\n\n\
         Portfolio records the quoted amount; the amount actually received may differ.\n\nConfirm?",
        trade.direction.label(),
        trade.symbol,
        trade.token,
        human(trade.amount, in_decimals),
        in_symbol,
        human(quote.expected_out, out_decimals),
        out_symbol,
        settings.slippage.percent().normalize(),
        human(quote.min_out, out_decimals),
        out_symbol,
        fee_line(snapshot),
    );
    Reply::text(text).with_keyboard(vec![vec![
        Button::new(format!("Confirm {}", trade.direction.label()), Action::Confirm(trade.direction)),
        Button::new("Cancel", Action::Cancel),
    ]])
}

pub fn submitted(report: &ExecutionReport, tx_url: &str) -> Reply {
    let mut text = format!("{} submitted!\n", report.direction.label());
    if report.direction == Direction::Sell {
        text.push_str(&format!(
            "\nEst. BNB: {}\n",
            abbreviate_opt(to_decimal(report.quote.expected_out, NATIVE_DECIMALS))
        ));
    }
    if let Some(approval) = report.approval_tx {
        text.push_str(&format!("\nApproval: {}", approval));
    }
    text.push_str(&format!("\nTx: {}\n{}", report.swap_tx, tx_url));
    if !report.ledger_synced {
        text.push_str("\n\nWarning: the trade was sent but your portfolio could not be updated.");
    }
    Reply::text(text).with_main_menu(true)
}

pub fn portfolio(valuation: &PortfolioValuation) -> Reply {
    if valuation.rows.is_empty() {
        return Reply::text("No tracked positions yet.").with_main_menu(true);
    }
    let mut lines = vec!["Portfolio".to_string()];
    for row in &valuation.rows {
        match (row.price_usd, row.value_usd, row.pnl_percent) {
            (Some(price), Some(value), Some(pnl)) => lines.push(format!(
                "\n{}\nCA: {}\nAmount: {}\nAvg: ${}\nNow: ${}\nValue: ${}\nPnL: {:+.2}%",
                row.symbol,
                row.token,
                abbreviate(row.amount),
                abbreviate(row.avg_cost_usd),
                abbreviate(price),
                abbreviate(value),
                pnl
            )),
            _ => lines.push(format!(
                "\n{} ({}):\nAmount: {}\nPrice: {}\nValue: {}",
                row.symbol,
                row.token,
                abbreviate(row.amount),
                abbreviate_opt(row.price_usd),
                abbreviate_opt(row.value_usd)
            )),
        }
    }
    match valuation.total_value_usd {
        Some(total) => lines.push(format!("\nTotal est. value: ${}", abbreviate(total))),
        None => lines.push("\nTotal est. value: Unknown".to_string()),
    }
    Reply::text(lines.join("\n")).with_main_menu(true)
}
