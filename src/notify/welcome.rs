//! Welcome email sent after registration

use super::EmailMessage;
use crate::accounts::{Email, Username};

/// Sender identity and links used to render the welcome email
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WelcomeTemplate {
    /// Domain of the sending address, e.g. `example.com`
    pub sender_domain: String,
    /// Display name shown with the sending address
    pub display_name: String,
    pub product_name: String,
    pub frontend_url: String,
}

impl WelcomeTemplate {
    pub fn sender(&self) -> String {
        format!("{} <welcome@{}>", self.display_name, self.sender_domain)
    }

    pub fn render(&self, username: &Username, to: &Email) -> EmailMessage {
        let product = &self.product_name;
        EmailMessage {
            from: self.sender(),
            to: to.as_str().to_string(),
            subject: format!("Welcome To {product}!"),
            body: format!(
                "Hello there {username}! Congratulations on joining {product}!\n\n\
                 Don't worry, we won't bug you! But if you ever need to, you can reset \
                 your password with this email. Tally-ho!\n\n\
                 {}\n\n",
                self.frontend_url
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_welcome() {
        let template = WelcomeTemplate {
            sender_domain: "tally.example".into(),
            display_name: "Tally".into(),
            product_name: "Tallyho".into(),
            frontend_url: "https://tally.example".into(),
        };
        let message = template.render(
            &Username::from_stored("alice").unwrap(),
            &Email::parse("alice@example.com").unwrap(),
        );

        assert_eq!(message.from, "Tally <welcome@tally.example>");
        assert_eq!(message.to, "alice@example.com");
        assert_eq!(message.subject, "Welcome To Tallyho!");
        assert!(message.body.starts_with("Hello there alice! Congratulations on joining Tallyho!"));
        assert!(message.body.contains("reset your password"));
        assert!(message.body.contains("https://tally.example"));
    }
}
