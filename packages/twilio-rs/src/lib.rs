// Thin client for the Twilio Messages REST API.
// https://www.twilio.com/docs/messaging/api/message-resource

use std::collections::HashMap;

use reqwest::{header, Client};
use serde::Deserialize;

#[derive(Debug, Clone)]
pub struct TwilioOptions {
    pub account_sid: String,
    pub auth_token: String,
    pub from_number: String,
}

/// Response returned by Twilio when a message is accepted.
#[derive(Debug, Clone, Deserialize)]
pub struct MessageResponse {
    pub sid: String,
    pub status: String,
    #[serde(default)]
    pub error_code: Option<i64>,
    #[serde(default)]
    pub error_message: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TwilioService {
    options: TwilioOptions,
    client: Client,
}

impl TwilioService {
    pub fn new(options: TwilioOptions) -> Self {
        Self {
            options,
            client: Client::new(),
        }
    }

    /// Send an SMS message to `to` (E.164 format, leading `+` required).
    pub async fn send_sms(&self, to: &str, body: &str) -> Result<MessageResponse, &'static str> {
        if !to.starts_with('+') {
            return Err("Phone number must include country code (E.164)");
        }

        let url = format!(
            "https://api.twilio.com/2010-04-01/Accounts/{sid}/Messages.json",
            sid = self.options.account_sid
        );

        let mut headers = header::HeaderMap::new();
        headers.insert(
            "Content-Type",
            "application/x-www-form-urlencoded"
                .parse()
                .expect("Header value should parse correctly"),
        );

        let mut form_body: HashMap<&str, String> = HashMap::new();
        form_body.insert("To", to.to_string());
        form_body.insert("From", self.options.from_number.clone());
        form_body.insert("Body", body.to_string());

        let res = self
            .client
            .post(url)
            .basic_auth(
                self.options.account_sid.clone(),
                Some(self.options.auth_token.clone()),
            )
            .headers(headers)
            .form(&form_body)
            .send()
            .await;

        match res {
            Ok(response) => {
                let status = response.status();
                if !status.is_success() {
                    let error_body = response.text().await.unwrap_or_default();
                    eprintln!("Twilio error ({}): {}", status, error_body);
                    return Err("Twilio returned an error");
                }

                match response.json::<MessageResponse>().await {
                    Ok(message) => {
                        if message.status == "failed" || message.error_code.is_some() {
                            eprintln!(
                                "Twilio message failed: {:?} (code: {:?})",
                                message.error_message, message.error_code
                            );
                            return Err("Twilio reported a delivery failure");
                        }
                        Ok(message)
                    }
                    Err(e) => {
                        eprintln!("Failed to parse Twilio response: {}", e);
                        Err("Error parsing message response")
                    }
                }
            }
            Err(e) => {
                eprintln!("Request to Twilio failed: {}", e);
                Err("Error sending SMS")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rejects_number_without_country_code() {
        let service = TwilioService::new(TwilioOptions {
            account_sid: "AC_test".to_string(),
            auth_token: "token".to_string(),
            from_number: "+15005550006".to_string(),
        });

        let result = service.send_sms("5551234567", "hello").await;
        assert!(result.is_err());
    }
}
