use super::sendmail::{MailError, MailSender};

pub const VERIFICATION_SUBJECT: &str = "Code de vérification de votre compte";

pub fn verification_email_body(full_name: &str, code: &str) -> String {
    format!(
        r#"<div style="font-family: Arial, sans-serif; max-width: 480px; margin: 0 auto;">
  <h2>Bonjour {full_name},</h2>
  <p>Merci pour votre inscription. Voici votre code de vérification :</p>
  <p style="font-size: 28px; font-weight: bold; letter-spacing: 6px;">{code}</p>
  <p>Ce code expire dans 1 heure.</p>
  <p>Si vous n'êtes pas à l'origine de cette demande, ignorez ce message.</p>
</div>"#
    )
}

pub async fn send_verification_email(
    mailer: &dyn MailSender,
    to_email: &str,
    full_name: &str,
    code: &str,
) -> Result<(), MailError> {
    let body = verification_email_body(full_name, code);
    mailer.send(to_email, VERIFICATION_SUBJECT, &body).await
}
