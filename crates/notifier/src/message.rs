use std::fmt::Write as _;

use primitives::BurnEvent;
use url::Url;

/// Token and explorer details shared by every burn message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageContext {
    /// Token ticker, e.g. `PEPE`
    pub symbol: String,
    /// Block explorer base URL used for transaction links
    pub explorer_url: Option<Url>,
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

/// Render `event` as a Telegram HTML message.
pub fn format_burn_message(event: &BurnEvent, ctx: &MessageContext) -> String {
    let mut msg = format!(
        "🔥 <b>{} {} burned</b>\n\n<b>Destination:</b> {}\n<b>Initiator:</b> <code>{}</code>\n",
        event.amount_formatted,
        escape_html(&ctx.symbol),
        event.destination.label(),
        event.initiator,
    );
    if event.via_intermediary() {
        let _ = writeln!(msg, "<b>Via:</b> <code>{}</code>", event.transfer_from);
    }
    let _ = writeln!(msg, "<b>Block:</b> {}", event.block_number);

    match &ctx.explorer_url {
        Some(base) => {
            let link = format!("{}/tx/{}", base.as_str().trim_end_matches('/'), event.tx_hash);
            let _ = write!(msg, "<a href=\"{link}\">View transaction</a>");
        }
        None => {
            let _ = write!(msg, "<b>Tx:</b> <code>{}</code>", event.tx_hash);
        }
    }
    msg
}
