//! Quote message rendering.

use rust_decimal::Decimal;

use super::contact::StudentContact;
use crate::config::{
    CLIENT_CITY_TOKEN, CLIENT_NAME_TOKEN, QUOTE_IN_PERSON_TOKEN, QUOTE_REMOTE_TOKEN, QuoteSettings,
};

/// What gets typed into the quote form for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteMessage {
    /// Entered in the price field.
    pub price: Decimal,
    pub message: String,
}

impl QuoteMessage {
    /// Fill the configured template for `contact`. The price field gets the
    /// remote rate.
    pub fn render(template: &str, contact: &StudentContact, prices: &QuoteSettings) -> Self {
        let message = template
            .replace(CLIENT_NAME_TOKEN, &contact.name)
            .replace(CLIENT_CITY_TOKEN, &contact.city)
            .replace(QUOTE_IN_PERSON_TOKEN, &prices.in_person.normalize().to_string())
            .replace(QUOTE_REMOTE_TOKEN, &prices.remote.normalize().to_string());

        Self {
            price: prices.remote,
            message,
        }
    }

    /// Price as typed into the form.
    pub fn price_text(&self) -> String {
        self.price.normalize().to_string()
    }
}
