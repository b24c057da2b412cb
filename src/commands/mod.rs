//! Dot commands typed in chat.

mod media;


pub use media::{prepare, reply_for, MediaJob};

/// Menu shown by `.bot`.
pub const MENU: &str = "\
🎉 *MENÚ DEL BOT* 🎉
💬 *.bot* — Mostrar este menú
🖼️ *.sticker* — Envía una imagen con este texto
🎨 *.imagenes <descripción>* — Generar una imagen
🤣 *.memes* — Un meme al azar
🎵 *.musica <nombre>* — Buscar una canción";

/// Reply for a dot command nobody knows.
pub const UNKNOWN: &str = "🤔 Comando no reconocido. Usa *.bot* para ver opciones.";

/// Known bot commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Menu,
    Sticker,
    Image,
    Meme,
    Music,
    /// A `.` command that is not recognised (the lowercased token).
    Unknown(String),
}

impl Command {
    /// Parse a command from message text. Returns `None` for text that is not
    /// a dot command, which the bot ignores.
    pub fn parse(text: &str) -> Option<Self> {
        let first = text.split_whitespace().next()?;
        if !first.starts_with('.') || first.len() == 1 {
            return None;
        }
        // Strip @botname suffix (e.g. ".bot@desterra" → ".bot").
        let cmd = first.split('@').next().unwrap_or(first).to_lowercase();
        Some(match cmd.as_str() {
            ".bot" => Self::Menu,
            ".sticker" => Self::Sticker,
            ".imagenes" | ".image" => Self::Image,
            ".memes" | ".meme" => Self::Meme,
            ".musica" | ".music" => Self::Music,
            _ => Self::Unknown(cmd),
        })
    }
}

/// Text after the command token, trimmed.
pub fn arguments(text: &str) -> &str {
    let text = text.trim_start();
    match text.find(char::is_whitespace) {
        Some(idx) => text[idx..].trim(),
        None => "",
    }
}
