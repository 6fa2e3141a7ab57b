//! Customer-facing texts and keyboards of the order form.

use crate::messaging::{escape_html, ActionButton, Keyboard, OutboundMessage};
use crate::services::exchange_rate::FOREIGN_CURRENCY;
use crate::services::order::{OrderDetails, PaymentMethod, Plan};
use crate::services::order_form::{payloads, FormState};
use crate::services::pricing::{format_amount, PricingBreakdown};

fn cancel_button() -> ActionButton {
    ActionButton::payload("✖ Cancel", payloads::CANCEL)
}

fn with_cancel(text: impl Into<String>) -> OutboundMessage {
    OutboundMessage::text(text).with_keyboard(Keyboard::new().row(vec![cancel_button()]))
}

/// The question asked for `state`.
pub fn prompt(state: &FormState) -> OutboundMessage {
    match state {
        FormState::Service => with_cancel(
            "Which service would you like to subscribe to? For example: Netflix, Spotify, Patreon.",
        ),
        FormState::Login { service } => with_cancel(format!(
            "Send the login (email or phone) of your <b>{}</b> account.",
            escape_html(service)
        )),
        FormState::Secret { .. } => with_cancel("Send the password for this account."),
        FormState::Source { .. } => with_cancel(
            "Where should the subscription be bought? Send a link to the page or creator.",
        ),
        FormState::Plan { .. } => {
            let mut buttons: Vec<ActionButton> = Plan::ALL
                .iter()
                .map(|plan| ActionButton::payload(plan.label(), payloads::plan(*plan)))
                .collect();
            buttons.push(cancel_button());
            OutboundMessage::text("Choose the subscription period:")
                .with_keyboard(Keyboard::single_column(buttons))
        }
        FormState::Price { plan, .. } => with_cancel(format!(
            "Plan: {}. Send the monthly price in {} (for example 9.99).",
            plan.label(),
            FOREIGN_CURRENCY
        )),
        FormState::Notes { .. } => OutboundMessage::text(
            "Anything the operator should know? Send your notes or \"-\" to skip.",
        )
        .with_keyboard(Keyboard::new().row(vec![
            ActionButton::payload("Skip", payloads::NOTES_SKIP),
            cancel_button(),
        ])),
        FormState::Confirm { details, breakdown } => {
            OutboundMessage::text(order_summary(details, breakdown)).with_keyboard(
                Keyboard::new()
                    .row(vec![
                        ActionButton::payload("✅ Confirm", payloads::CONFIRM_ACCEPT),
                        ActionButton::payload("✏️ Start over", payloads::CONFIRM_EDIT),
                    ])
                    .row(vec![cancel_button()]),
            )
        }
        FormState::PaymentMethod { breakdown, .. } => {
            let mut buttons: Vec<ActionButton> = PaymentMethod::ALL
                .iter()
                .map(|method| ActionButton::payload(method.label(), payloads::pay(*method)))
                .collect();
            buttons.push(cancel_button());
            OutboundMessage::text(format!(
                "Total: <b>{} ₽</b>. How would you like to pay?",
                format_amount(breakdown.final_total)
            ))
            .with_keyboard(Keyboard::single_column(buttons))
        }
    }
}

/// Order review shown before confirmation. The password is not echoed back.
pub fn order_summary(details: &OrderDetails, breakdown: &PricingBreakdown) -> String {
    let notes = if details.notes.is_empty() {
        "—".to_string()
    } else {
        escape_html(&details.notes)
    };
    format!(
        "<b>Please check your order</b>\n\
         Service: {}\n\
         Login: {}\n\
         Source: {}\n\
         Plan: {}\n\
         Price: ${} × {} = ${}\n\
         Rate: {}\n\
         Base: {} ₽\n\
         Fee: {} ₽\n\
         Notes: {}\n\n\
         Total to pay: <b>{} ₽</b>",
        escape_html(&details.account.service),
        escape_html(&details.account.login),
        escape_html(&details.source),
        details.plan.label(),
        format_amount(details.monthly_price),
        breakdown.months,
        format_amount(breakdown.total_foreign),
        format_amount(breakdown.rate),
        format_amount(breakdown.base_settlement),
        format_amount(breakdown.fee_amount),
        notes,
        format_amount(breakdown.final_total),
    )
}

pub fn welcome() -> String {
    "👋 Hi! I can buy a foreign subscription for you and you pay in rubles.\n\
     Answer a few questions and I will calculate the price."
        .to_string()
}

pub fn help(support_contact: &str) -> String {
    format!(
        "/start or /restart begins a new order\n\
         /cancel drops the current order\n\
         /help shows this message\n\n\
         Questions? Contact {}.",
        escape_html(support_contact)
    )
}

pub fn no_active_order() -> String {
    "There is no active order. Send /start to begin.".to_string()
}

pub fn cancelled() -> String {
    "Order cancelled. Send /start whenever you want to try again.".to_string()
}

pub fn offline_submitted(method: PaymentMethod) -> String {
    format!(
        "Thank you! Your order is accepted. A manager will contact you to arrange payment ({}).",
        method.label()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::order::Account;
    use crate::services::pricing::PricingEngine;
    use rust_decimal_macros::dec;

    #[test]
    fn plan_prompt_offers_every_plan_and_cancel() {
        let state = FormState::Plan {
            account: Account {
                service: "Netflix".to_string(),
                login: "a".to_string(),
                password: "b".to_string(),
            },
            source: "c".to_string(),
        };
        let keyboard = prompt(&state).keyboard.unwrap();
        assert_eq!(
            keyboard.payloads(),
            vec!["plan:1m", "plan:3m", "plan:9m", "plan:12m", "cancel"]
        );
    }

    #[test]
    fn summary_hides_password_and_escapes_input() {
        let details = OrderDetails {
            account: Account {
                service: "<b>Spotify</b>".to_string(),
                login: "me@example.com".to_string(),
                password: "hunter2".to_string(),
            },
            source: "friend".to_string(),
            plan: Plan::OneMonth,
            monthly_price: dec!(30),
            notes: String::new(),
        };
        let breakdown = PricingEngine::default()
            .quote(dec!(30), Plan::OneMonth, dec!(90))
            .unwrap();

        let text = order_summary(&details, &breakdown);
        assert!(!text.contains("hunter2"));
        assert!(text.contains("&lt;b&gt;Spotify&lt;/b&gt;"));
        assert!(text.contains("Base: 2820 ₽"));
        assert!(text.contains("Fee: 920 ₽"));
        assert!(text.contains("<b>3740 ₽</b>"));
    }
}
