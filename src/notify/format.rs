//! Human-readable message text
//!
//! Messages are plain text (no Telegram parse mode), so nothing here needs
//! escaping.

use chrono::{DateTime, FixedOffset, Utc};

use crate::baseline::DailyBaseline;
use crate::market::MarketSnapshot;
use crate::signal::change::percent_change;
use crate::signal::{AlertEvent, Direction};

/// Price with precision chosen by magnitude so small caps stay readable
pub fn format_price(price: f64) -> String {
    if price < 0.0001 {
        format!("${:.10}", price)
    } else if price < 0.01 {
        format!("${:.8}", price)
    } else if price < 1.0 {
        format!("${:.6}", price)
    } else {
        format!("${:.4}", price)
    }
}

/// Market cap as billions, millions or whole dollars
pub fn format_market_cap(cap: f64) -> String {
    if cap >= 1e9 {
        format!("${:.2}B", cap / 1e9)
    } else if cap >= 1e6 {
        format!("${:.2}M", cap / 1e6)
    } else {
        format!("${}", group_thousands(cap, 0))
    }
}

/// Signed percentage with two decimals, e.g. `+5.00%`
pub fn format_pct(pct: f64) -> String {
    format!("{:+.2}%", pct)
}

/// `1234567.891` with two decimals -> `1,234,567.89`
fn group_thousands(value: f64, decimals: usize) -> String {
    let formatted = format!("{:.*}", decimals, value.abs());
    let (int_part, frac_part) = match formatted.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (formatted.as_str(), None),
    };

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let sign = if value < 0.0 { "-" } else { "" };
    match frac_part {
        Some(frac) => format!("{}{}.{}", sign, grouped, frac),
        None => format!("{}{}", sign, grouped),
    }
}

/// When the baseline was taken, in the configured offset
pub fn baseline_label(baseline: &DailyBaseline, offset: FixedOffset) -> String {
    format!(
        "{} {}",
        baseline.date,
        baseline.created_at.with_timezone(&offset).format("%H:%M")
    )
}

pub fn alert_message(
    event: &AlertEvent,
    total_market_cap: Option<f64>,
    baseline_label: Option<&str>,
) -> String {
    let (header, token_icon, change_icon, footer) = match event.direction {
        Direction::Pump => ("🚀 🟢🟢PUMP ALERT🟢🟢 🚀", "🔥", "📈", "🎯 TO THE MOON! 🌙"),
        Direction::Dump => ("📉 🔴🔴DUMP ALERT🔴🔴 📉", "💔", "📉", "⚠️ PRICE DROPPING! ⚡️"),
    };

    let mut lines = vec![
        header.to_string(),
        format!("⏰ Timeframe: {}", event.timeframe),
        format!("{} Token: #{}", token_icon, event.symbol),
        format!("💰 Price: {}", format_price(event.price)),
        format!("{} Price Change: {}", change_icon, format_pct(event.price_change_pct)),
    ];

    match event.volume_change_pct {
        Some(v) => lines.push(format!("📊 Volume Change: {}", format_pct(v))),
        None => lines.push("📊 Volume Change: n/a".to_string()),
    }
    lines.push(format!("📊 24h Volume: ${}", group_thousands(event.volume, 2)));

    if let Some(cap) = event.market_cap.filter(|c| *c > 0.0) {
        lines.push(format!("💎 Market Cap: {}", format_market_cap(cap)));
    }
    if let Some(total) = total_market_cap.filter(|c| *c > 0.0) {
        lines.push(format!("🏆 Total Portfolio Cap: {}", format_market_cap(total)));
    }
    if let (Some(daily), Some(label)) = (event.daily_change_pct, baseline_label) {
        lines.push(format!("📅 24h Change (since {}): {}", label, format_pct(daily)));
    }

    lines.push(footer.to_string());
    lines.join("\n")
}

/// Informational notice after a new daily baseline was stored
pub fn snapshot_notice(baseline: &DailyBaseline, offset: FixedOffset) -> String {
    let local = baseline.created_at.with_timezone(&offset);
    [
        "📅 Daily Snapshot Saved!".to_string(),
        format!("🕕 Time: {} at {}", baseline.date, local.format("%H:%M:%S")),
        format!(
            "💰 Total Portfolio Cap: {}",
            format_market_cap(baseline.total_market_cap)
        ),
        format!("📊 Tokens: {}", baseline.token_count()),
        "ℹ️ This will be used for 24h change calculations".to_string(),
    ]
    .join("\n")
}

/// Periodic overview of every tracked symbol
pub fn summary_message(
    snapshot: &MarketSnapshot,
    baseline: Option<&DailyBaseline>,
    offset: FixedOffset,
    now: DateTime<Utc>,
) -> String {
    let mut lines = vec!["📊 Market update".to_string(), String::new()];

    for (symbol, quote) in &snapshot.quotes {
        let mut line = format!("💰 {}: {}", symbol, format_price(quote.price));
        if let Some(cap) = quote.market_cap.filter(|c| *c > 0.0) {
            line.push_str(&format!(" ({})", format_market_cap(cap)));
        }
        let daily = baseline
            .and_then(|b| b.price(symbol))
            .and_then(|base| percent_change(base, quote.price));
        if let Some(daily) = daily {
            line.push_str(&format!(" [24h: {}]", format_pct(daily)));
        }
        lines.push(line);
    }

    if snapshot.total_market_cap > 0.0 {
        lines.push(String::new());
        lines.push(format!(
            "🏆 Total Portfolio Cap: {}",
            format_market_cap(snapshot.total_market_cap)
        ));
    }
    if let Some(baseline) = baseline {
        lines.push(format!("📅 Daily baseline: {}", baseline_label(baseline, offset)));
    }

    lines.push(String::new());
    lines.push(format!(
        "🕐 Updated: {}",
        now.with_timezone(&offset).format("%H:%M:%S")
    ));
    lines.join("\n")
}
