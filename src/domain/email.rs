use validator::ValidateEmail;

#[derive(Debug, Clone, PartialEq, Eq)]
/// A validated e-mail address, lowercased. Used for `users.email`, where full
/// RFC-shaped validation is appropriate (this is not the looser rule applied
/// to CSV row cells; see `worker::csv_import::validate_email`).
pub struct Email(String);

impl Email {
    pub fn parse(email: String) -> Result<Self, String> {
        let email = email.trim().to_lowercase();
        ValidateEmail::validate_email(&email)
            .then_some(Self(email.clone()))
            .ok_or(format!("invalid email: {email:?}"))
    }
}

impl AsRef<str> for Email {
    fn as_ref(&self) -> &str { &self.0 }
}

impl From<Email> for String {
    fn from(value: Email) -> Self { value.0 }
}
