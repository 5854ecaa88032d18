//! ESC/POS command builder.
//!
//! Text is transcoded to code page 850, which covers Spanish. Characters the
//! page lacks become `?`.

const ESC: u8 = 0x1B;
const GS: u8 = 0x1D;
const LF: u8 = 0x0A;

/// `ESC t n` value selecting PC850 (Multilingual).
const CODE_PAGE_PC850: u8 = 2;

/// Horizontal alignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Align {
    Left,
    Center,
    Right,
}

/// Builds a byte stream of ESC/POS commands.
#[derive(Debug, Clone, Default)]
pub struct EscPos {
    buf: Vec<u8>,
}

impl EscPos {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// `ESC @`: reset the printer.
    #[must_use]
    pub fn init(mut self) -> Self {
        self.buf.extend_from_slice(&[ESC, b'@']);
        self
    }

    /// `ESC t 2`: select PC850.
    #[must_use]
    pub fn code_page_pc850(mut self) -> Self {
        self.buf.extend_from_slice(&[ESC, b't', CODE_PAGE_PC850]);
        self
    }

    /// `ESC a n`.
    #[must_use]
    pub fn align(mut self, align: Align) -> Self {
        let n = match align {
            Align::Left => 0,
            Align::Center => 1,
            Align::Right => 2,
        };
        self.buf.extend_from_slice(&[ESC, b'a', n]);
        self
    }

    /// `ESC E n`.
    #[must_use]
    pub fn bold(mut self, on: bool) -> Self {
        self.buf.extend_from_slice(&[ESC, b'E', u8::from(on)]);
        self
    }

    /// `GS ! n`: double width and height, or normal size.
    #[must_use]
    pub fn double_size(mut self, on: bool) -> Self {
        self.buf.extend_from_slice(&[GS, b'!', if on { 0x11 } else { 0x00 }]);
        self
    }

    /// Raw text, transcoded to PC850.
    #[must_use]
    pub fn text(mut self, text: &str) -> Self {
        self.buf.extend(encode_pc850(text));
        self
    }

    /// Text followed by a line feed.
    #[must_use]
    pub fn line(self, text: &str) -> Self {
        let mut this = self.text(text);
        this.buf.push(LF);
        this
    }

    /// `ESC d n`: print and feed `n` lines.
    #[must_use]
    pub fn feed(mut self, lines: u8) -> Self {
        self.buf.extend_from_slice(&[ESC, b'd', lines]);
        self
    }

    /// `GS V 66 n`: feed `n` dots and partial cut.
    #[must_use]
    pub fn cut(mut self) -> Self {
        self.buf.extend_from_slice(&[GS, b'V', 66, 3]);
        self
    }

    #[must_use]
    pub fn build(self) -> Vec<u8> {
        self.buf
    }
}

/// Map a character to its PC850 byte.
#[must_use]
pub const fn pc850_byte(c: char) -> Option<u8> {
    let byte = match c {
        '\n' => LF,
        ' '..='~' => c as u8,
        'ü' => 0x81,
        'é' => 0x82,
        'â' => 0x83,
        'ä' => 0x84,
        'à' => 0x85,
        'ç' => 0x87,
        'ê' => 0x88,
        'è' => 0x8A,
        'É' => 0x90,
        'ô' => 0x93,
        'ö' => 0x94,
        'û' => 0x96,
        'Ü' => 0x9A,
        'á' => 0xA0,
        'í' => 0xA1,
        'ó' => 0xA2,
        'ú' => 0xA3,
        'ñ' => 0xA4,
        'Ñ' => 0xA5,
        'ª' => 0xA6,
        'º' => 0xA7,
        '¿' => 0xA8,
        '¡' => 0xAD,
        'Á' => 0xB5,
        'Í' => 0xD6,
        'Ó' => 0xE0,
        'Ú' => 0xE9,
        '°' => 0xF8,
        _ => return None,
    };
    Some(byte)
}

/// Encode text as PC850, replacing unsupported characters with `?`.
#[must_use]
pub fn encode_pc850(text: &str) -> Vec<u8> {
    text.chars().map(|c| pc850_byte(c).unwrap_or(b'?')).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spanish_characters() {
        assert_eq!(
            encode_pc850("¿Año?¡Sí!"),
            vec![0xA8, b'A', 0xA4, b'o', b'?', 0xAD, b'S', 0xA1, b'!']
        );
        assert_eq!(encode_pc850("ÁÉÍÓÚÑü"), vec![0xB5, 0x90, 0xD6, 0xE0, 0xE9, 0xA5, 0x81]);
    }

    #[test]
    fn test_unknown_characters_become_question_marks() {
        assert_eq!(encode_pc850("€ 5 ✓"), vec![b'?', b' ', b'5', b' ', b'?']);
    }

    #[test]
    fn test_command_sequence() {
        let bytes = EscPos::new()
            .init()
            .code_page_pc850()
            .align(Align::Center)
            .bold(true)
            .line("Hola")
            .bold(false)
            .feed(3)
            .cut()
            .build();

        assert_eq!(
            bytes,
            vec![
                0x1B, b'@', 0x1B, b't', 2, 0x1B, b'a', 1, 0x1B, b'E', 1, b'H', b'o', b'l', b'a',
                0x0A, 0x1B, b'E', 0, 0x1B, b'd', 3, 0x1D, b'V', 66, 3,
            ]
        );
    }

    #[test]
    fn test_double_size() {
        assert_eq!(EscPos::new().double_size(true).build(), vec![0x1D, b'!', 0x11]);
        assert_eq!(EscPos::new().double_size(false).build(), vec![0x1D, b'!', 0x00]);
    }
}
