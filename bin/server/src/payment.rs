//! MaxiCash payment redirect.
//!
//! The checkout page posts its form here; the response is an HTML page whose
//! form submits itself to the MaxiCash gateway with the merchant credentials
//! filled in server-side.

use kelasi_core::PaymentReference;
use serde::Deserialize;
use std::fmt;

/// Merchant configuration for the payment gateway.
#[derive(Clone, Deserialize)]
pub struct PaymentConfig {
    /// MaxiCash merchant identifier.
    pub merchant_id: String,
    /// MaxiCash merchant password.
    pub merchant_password: String,
    /// Gateway URL the form posts to.
    pub api_url: String,
    /// Language of the gateway pages.
    #[serde(default = "crate::config::default_language")]
    pub language: String,
}

impl fmt::Debug for PaymentConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PaymentConfig")
            .field("merchant_id", &self.merchant_id)
            .field("merchant_password", &"[redacted]")
            .field("api_url", &self.api_url)
            .field("language", &self.language)
            .finish()
    }
}

impl PaymentConfig {
    fn is_complete(&self) -> bool {
        [&self.merchant_id, &self.merchant_password, &self.api_url]
            .iter()
            .all(|value| !value.trim().is_empty())
    }
}

/// The checkout form, with the field names the checkout page uses.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutForm {
    pub email: String,
    pub telephone: String,
    /// Amount in minor units.
    #[serde(rename = "Amount")]
    pub amount: String,
    #[serde(rename = "Currency")]
    pub currency: String,
    pub accepturl: String,
    pub declineurl: String,
    #[serde(default)]
    pub cancelurl: Option<String>,
}

/// Errors preparing a payment redirect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentError {
    /// Merchant credentials are absent or blank.
    NotConfigured,
    /// The amount is not a non-negative integer.
    InvalidAmount { value: String },
    /// The currency is not a three-letter code.
    InvalidCurrency { value: String },
    /// A required form field is blank.
    MissingField { field: &'static str },
}

impl fmt::Display for PaymentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotConfigured => write!(f, "payment gateway is not configured"),
            Self::InvalidAmount { value } => write!(f, "invalid amount '{value}'"),
            Self::InvalidCurrency { value } => write!(f, "invalid currency '{value}'"),
            Self::MissingField { field } => write!(f, "missing form field '{field}'"),
        }
    }
}

impl std::error::Error for PaymentError {}

impl PaymentError {
    /// Message safe to show to a customer.
    #[must_use]
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::NotConfigured => {
                "Une erreur interne est survenue lors de la préparation du paiement."
            }
            Self::InvalidAmount { .. } => "Le montant est invalide.",
            Self::InvalidCurrency { .. } => "La devise est invalide.",
            Self::MissingField { .. } => "Veuillez remplir tous les champs du formulaire.",
        }
    }
}

/// Renders the self-submitting gateway form.
///
/// Every interpolated value is HTML-escaped.
///
/// # Errors
///
/// Returns `NotConfigured` when merchant credentials are missing, or a
/// validation error for the form.
pub fn redirect_page(
    config: Option<&PaymentConfig>,
    form: &CheckoutForm,
    reference: &PaymentReference,
) -> Result<String, PaymentError> {
    let config = config
        .filter(|c| c.is_complete())
        .ok_or(PaymentError::NotConfigured)?;

    let amount = form.amount.trim();
    amount
        .parse::<u64>()
        .map_err(|_| PaymentError::InvalidAmount {
            value: form.amount.clone(),
        })?;

    let currency = form.currency.trim().to_ascii_uppercase();
    if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(PaymentError::InvalidCurrency {
            value: form.currency.clone(),
        });
    }

    for (field, value) in [
        ("email", &form.email),
        ("telephone", &form.telephone),
        ("accepturl", &form.accepturl),
        ("declineurl", &form.declineurl),
    ] {
        if value.trim().is_empty() {
            return Err(PaymentError::MissingField { field });
        }
    }

    let reference = reference.to_string();
    let cancel_url = form.cancelurl.as_deref().unwrap_or(&form.declineurl);
    let fields = [
        ("PayType", "MaxiCash"),
        ("Amount", amount),
        ("Currency", currency.as_str()),
        ("MerchantID", config.merchant_id.as_str()),
        ("MerchantPassword", config.merchant_password.as_str()),
        ("Language", config.language.as_str()),
        ("Reference", reference.as_str()),
        ("email", form.email.trim()),
        ("telephone", form.telephone.trim()),
        ("accepturl", form.accepturl.trim()),
        ("declineurl", form.declineurl.trim()),
        ("cancelurl", cancel_url.trim()),
    ];

    let inputs: String = fields
        .iter()
        .map(|(name, value)| {
            format!(
                "      <input type=\"hidden\" name=\"{}\" value=\"{}\" />\n",
                escape_html(name),
                escape_html(value)
            )
        })
        .collect();

    Ok(format!(
        "<!DOCTYPE html>
<html lang=\"{lang}\">
  <head>
    <meta charset=\"utf-8\" />
    <title>Redirection vers MaxiCash...</title>
  </head>
  <body onload=\"document.forms[0].submit()\">
    <p>Vous allez être redirigé vers notre partenaire de paiement MaxiCash. Si la redirection ne fonctionne pas, veuillez cliquer sur le bouton ci-dessous.</p>
    <form action=\"{action}\" method=\"POST\">
{inputs}      <button type=\"submit\">Continuer vers le paiement</button>
    </form>
  </body>
</html>
",
        lang = escape_html(&config.language),
        action = escape_html(&config.api_url),
    ))
}

fn escape_html(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            other => escaped.push(other),
        }
    }
    escaped
}
