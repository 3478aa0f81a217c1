//! Pairing challenge rendering
//!
//! When the transport needs the account to be linked it emits a QR payload.
//! Rendering it is a side effect only; a renderer never fails the session.

use qrcode::render::unicode;
use qrcode::QrCode;
use tracing::{info, warn};

/// Renders a pairing challenge for out-of-band scanning
pub trait PairingRenderer: Send + Sync {
    /// Render `payload`
    fn render(&self, payload: &str);
}

/// Logs the raw payload
#[derive(Clone, Copy, Debug, Default)]
pub struct LogPairingRenderer;

impl PairingRenderer for LogPairingRenderer {
    fn render(&self, payload: &str) {
        info!(qr = payload, "Pairing challenge received");
    }
}

/// Prints the payload as a QR code to stderr
#[derive(Clone, Copy, Debug, Default)]
pub struct TerminalQrRenderer;

impl TerminalQrRenderer {
    /// Render to a string of Unicode half blocks
    pub fn to_text(payload: &str) -> Result<String, qrcode::types::QrError> {
        let code = QrCode::new(payload.as_bytes())?;
        Ok(code
            .render::<unicode::Dense1x2>()
            .dark_color(unicode::Dense1x2::Light)
            .light_color(unicode::Dense1x2::Dark)
            .quiet_zone(true)
            .build())
    }
}

impl PairingRenderer for TerminalQrRenderer {
    fn render(&self, payload: &str) {
        match Self::to_text(payload) {
            Ok(text) => {
                eprintln!("Scan this code with the linked-devices screen:");
                eprintln!("{}", text);
            }
            Err(e) => {
                warn!("Could not render pairing QR ({}); raw payload follows", e);
                eprintln!("{}", payload);
            }
        }
    }
}
