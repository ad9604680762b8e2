//! Text-mode files.
//!
//! [`ZstdTextFile`] layers character decoding and newline translation over a
//! [`ZstdFile`]. Decoding is strict: malformed input or unmappable characters
//! are [`ZframeError::EncodingError`].

use std::fmt;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use encoding_rs::{Decoder, DecoderResult, Encoding, EncoderResult, UTF_8};
use zframe_core::EndDirective;
use zframe_core::error::{Result, ZframeError};

use crate::file::{FileOptions, ZstdFile};

/// Decoded bytes pulled per refill.
const TEXT_CHUNK: usize = 8 * 1024;

/// Newline handling, following the usual text-file conventions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NewlineMode {
    /// Any of `\n`, `\r` and `\r\n` ends a line and reads as `\n`.
    /// Writes translate `\n` to the platform line separator.
    #[default]
    Universal,
    /// Any of `\n`, `\r` and `\r\n` ends a line; nothing is translated.
    Untranslated,
    /// Only `\n` ends a line.
    Lf,
    /// Only `\r` ends a line; writes translate `\n` to `\r`.
    Cr,
    /// Only `\r\n` ends a line; writes translate `\n` to `\r\n`.
    CrLf,
}

impl NewlineMode {
    fn write_separator(self) -> Option<&'static str> {
        match self {
            Self::Universal if cfg!(windows) => Some("\r\n"),
            Self::Universal | Self::Untranslated | Self::Lf => None,
            Self::Cr => Some("\r"),
            Self::CrLf => Some("\r\n"),
        }
    }
}

/// A compressed text file.
pub struct ZstdTextFile<F> {
    file: ZstdFile<F>,
    encoding: &'static Encoding,
    decoder: Decoder,
    newline: NewlineMode,
    /// Decoded, untranslated text; `text[text_pos..]` is unread.
    text: String,
    text_pos: usize,
    eof: bool,
}

impl<F> fmt::Debug for ZstdTextFile<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ZstdTextFile")
            .field("file", &self.file)
            .field("encoding", &self.encoding.name())
            .field("newline", &self.newline)
            .field("eof", &self.eof)
            .finish_non_exhaustive()
    }
}

impl<F> ZstdTextFile<F> {
    /// Wrap a binary file.
    pub fn new(file: ZstdFile<F>, encoding: &'static Encoding, newline: NewlineMode) -> Self {
        Self {
            file,
            encoding,
            decoder: encoding.new_decoder_with_bom_removal(),
            newline,
            text: String::new(),
            text_pos: 0,
            eof: false,
        }
    }

    /// The character encoding.
    pub fn encoding(&self) -> &'static Encoding {
        self.encoding
    }

    /// The newline mode.
    pub fn newline(&self) -> NewlineMode {
        self.newline
    }

    /// The underlying binary file.
    pub fn get_ref(&self) -> &ZstdFile<F> {
        &self.file
    }

    /// End the current block or frame.
    pub fn flush_with(&mut self, mode: EndDirective) -> Result<()> {
        self.file.flush_with(mode)
    }

    /// Close the underlying binary file.
    pub fn close(&mut self) -> Result<()> {
        self.file.close()
    }

    /// Close and return the underlying stream.
    pub fn into_inner(self) -> Result<F> {
        self.file.into_inner()
    }

    fn unread(&self) -> &str {
        &self.text[self.text_pos..]
    }

    /// Byte length of the next line within the unread text, if complete.
    fn line_end(&self) -> Option<usize> {
        let rest = self.unread();
        match self.newline {
            NewlineMode::Universal | NewlineMode::Untranslated => {
                let i = rest.find(['\r', '\n'])?;
                if rest.as_bytes()[i] == b'\n' {
                    return Some(i + 1);
                }
                match rest.as_bytes().get(i + 1) {
                    Some(b'\n') => Some(i + 2),
                    Some(_) => Some(i + 1),
                    // A trailing `\r` may be the start of `\r\n`.
                    None if self.eof => Some(i + 1),
                    None => None,
                }
            }
            NewlineMode::Lf => rest.find('\n').map(|i| i + 1),
            NewlineMode::Cr => rest.find('\r').map(|i| i + 1),
            NewlineMode::CrLf => rest.find("\r\n").map(|i| i + 2),
        }
    }

    fn translate(&self, text: &str) -> String {
        if self.newline == NewlineMode::Universal {
            text.replace("\r\n", "\n").replace('\r', "\n")
        } else {
            text.to_owned()
        }
    }

    fn take(&mut self, len: usize) -> String {
        let start = self.text_pos;
        self.text_pos += len;
        let taken = self.translate(&self.text[start..start + len]);
        if self.text_pos == self.text.len() {
            self.text.clear();
            self.text_pos = 0;
        }
        taken
    }
}

impl<F: Read> ZstdTextFile<F> {
    /// Decode another chunk. Returns false once everything is decoded.
    fn refill(&mut self) -> Result<bool> {
        if self.eof {
            return Ok(false);
        }
        let bytes = self.file.read1(Some(TEXT_CHUNK))?;
        let last = bytes.is_empty();

        if self.text_pos > 0 {
            self.text.drain(..self.text_pos);
            self.text_pos = 0;
        }
        let mut input = &bytes[..];
        loop {
            let needed = self
                .decoder
                .max_utf8_buffer_length_without_replacement(input.len())
                .unwrap_or(input.len() * 3 + 16);
            self.text.reserve(needed);
            let (result, read) =
                self.decoder
                    .decode_to_string_without_replacement(input, &mut self.text, last);
            input = &input[read..];
            match result {
                DecoderResult::InputEmpty => break,
                DecoderResult::OutputFull => continue,
                DecoderResult::Malformed(_, _) => {
                    return Err(ZframeError::encoding_error(format!(
                        "malformed {} data",
                        self.encoding.name()
                    )));
                }
            }
        }
        if last {
            self.eof = true;
        }
        Ok(true)
    }

    /// Read one line including its terminator. Returns an empty string at
    /// the end of the file.
    pub fn read_line(&mut self) -> Result<String> {
        loop {
            if let Some(len) = self.line_end() {
                return Ok(self.take(len));
            }
            if !self.refill()? {
                let len = self.unread().len();
                return Ok(self.take(len));
            }
        }
    }

    /// Read all remaining text.
    pub fn read_to_string(&mut self) -> Result<String> {
        while self.refill()? {}
        let len = self.unread().len();
        Ok(self.take(len))
    }

    /// Iterate over the remaining lines.
    pub fn lines(&mut self) -> Lines<'_, F> {
        Lines { file: self }
    }
}

impl<F: Write> ZstdTextFile<F> {
    /// Encode and write `text`, translating newlines.
    pub fn write_str(&mut self, text: &str) -> Result<()> {
        let text = match self.newline.write_separator() {
            Some(separator) => std::borrow::Cow::Owned(text.replace('\n', separator)),
            None => std::borrow::Cow::Borrowed(text),
        };
        let bytes = encode_strict(self.encoding, &text)?;
        self.file.write_all(&bytes)?;
        Ok(())
    }
}

fn encode_strict(encoding: &'static Encoding, text: &str) -> Result<Vec<u8>> {
    let output = encoding.output_encoding();
    if output == UTF_8 {
        return Ok(text.as_bytes().to_vec());
    }
    let mut encoder = output.new_encoder();
    let mut out = Vec::new();
    let mut input = text;
    loop {
        let needed = encoder
            .max_buffer_length_from_utf8_without_replacement(input.len())
            .unwrap_or(input.len() * 4 + 16);
        out.reserve(needed);
        let (result, read) = encoder.encode_from_utf8_to_vec_without_replacement(input, &mut out, true);
        input = &input[read..];
        match result {
            EncoderResult::InputEmpty => return Ok(out),
            EncoderResult::OutputFull => continue,
            EncoderResult::Unmappable(c) => {
                return Err(ZframeError::encoding_error(format!(
                    "character {c:?} cannot be encoded in {}",
                    output.name()
                )));
            }
        }
    }
}

/// Iterator over the lines of a [`ZstdTextFile`].
pub struct Lines<'a, F> {
    file: &'a mut ZstdTextFile<F>,
}

impl<F: Read> Iterator for Lines<'_, F> {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.file.read_line() {
            Ok(line) if line.is_empty() => None,
            other => Some(other),
        }
    }
}

/// Settings for [`open`].
#[derive(Debug, Clone, Default)]
pub struct OpenOptions {
    file: FileOptions,
    encoding: Option<&'static Encoding>,
    newline: Option<NewlineMode>,
}

impl OpenOptions {
    /// Default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Binary session settings.
    pub fn with_file_options(mut self, options: FileOptions) -> Self {
        self.file = options;
        self
    }

    /// Character encoding by WHATWG label, e.g. `"utf-8"` or `"shift_jis"`
    /// (text modes only).
    pub fn with_encoding(mut self, label: &str) -> Result<Self> {
        let encoding = Encoding::for_label(label.as_bytes())
            .ok_or_else(|| ZframeError::invalid_config(format!("unknown encoding: {label:?}")))?;
        self.encoding = Some(encoding);
        Ok(self)
    }

    /// Newline handling (text modes only).
    pub fn with_newline(mut self, newline: NewlineMode) -> Self {
        self.newline = Some(newline);
        self
    }
}

/// A file returned by [`open`].
#[derive(Debug)]
pub enum OpenFile {
    /// Opened in a binary mode.
    Binary(ZstdFile<File>),
    /// Opened in a text mode.
    Text(ZstdTextFile<File>),
}

/// Open a compressed file in binary (`r`, `rb`, `w`, ...) or text (`rt`,
/// `wt`, `at`, `xt`) mode.
pub fn open(path: impl AsRef<Path>, mode: &str, options: OpenOptions) -> Result<OpenFile> {
    let OpenOptions {
        file,
        encoding,
        newline,
    } = options;

    match mode.strip_suffix('t') {
        Some(binary) if matches!(binary, "r" | "w" | "a" | "x") => {
            let file = ZstdFile::open_with(path, binary, file)?;
            Ok(OpenFile::Text(ZstdTextFile::new(
                file,
                encoding.unwrap_or(UTF_8),
                newline.unwrap_or_default(),
            )))
        }
        Some(_) => Err(ZframeError::invalid_config(format!("invalid mode: {mode:?}"))),
        None => {
            if encoding.is_some() || newline.is_some() {
                return Err(ZframeError::invalid_config(
                    "encoding and newline options apply only to text modes",
                ));
            }
            Ok(OpenFile::Binary(ZstdFile::open_with(path, mode, file)?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn text_file(
        raw: Vec<u8>,
        encoding: &'static Encoding,
        newline: NewlineMode,
    ) -> ZstdTextFile<Cursor<Vec<u8>>> {
        let file = ZstdFile::new(Cursor::new(raw), "r").unwrap();
        ZstdTextFile::new(file, encoding, newline)
    }

    fn compressed(text: &[u8]) -> Vec<u8> {
        crate::compress(text).unwrap()
    }

    #[test]
    fn test_universal_newlines() {
        let mut file = text_file(compressed(b"one\r\ntwo\rthree\nfour"), UTF_8, NewlineMode::Universal);
        let lines: Vec<String> = file.lines().collect::<Result<_>>().unwrap();
        assert_eq!(lines, ["one\n", "two\n", "three\n", "four"]);
    }

    #[test]
    fn test_untranslated_newlines() {
        let mut file = text_file(compressed(b"a\r\nb\rc\n"), UTF_8, NewlineMode::Untranslated);
        assert_eq!(file.read_line().unwrap(), "a\r\n");
        assert_eq!(file.read_line().unwrap(), "b\r");
        assert_eq!(file.read_line().unwrap(), "c\n");
        assert_eq!(file.read_line().unwrap(), "");
    }

    #[test]
    fn test_fixed_newlines() {
        let mut file = text_file(compressed(b"a\r\nb\nc"), UTF_8, NewlineMode::CrLf);
        assert_eq!(file.read_line().unwrap(), "a\r\n");
        assert_eq!(file.read_line().unwrap(), "b\nc");

        let mut file = text_file(compressed(b"a\r\nb"), UTF_8, NewlineMode::Cr);
        assert_eq!(file.read_line().unwrap(), "a\r");
        assert_eq!(file.read_line().unwrap(), "\nb");
    }

    #[test]
    fn test_read_to_string_translates() {
        let mut file = text_file(compressed(b"x\r\ny\r"), UTF_8, NewlineMode::Universal);
        assert_eq!(file.read_to_string().unwrap(), "x\ny\n");
    }

    #[test]
    fn test_malformed_input_is_encoding_error() {
        let mut file = text_file(compressed(b"ok \xff\xfe bad"), UTF_8, NewlineMode::Lf);
        let err = file.read_to_string().unwrap_err();
        assert!(matches!(err, ZframeError::EncodingError { .. }));
    }

    #[test]
    fn test_shift_jis_round_trip() {
        let sjis = Encoding::for_label(b"shift_jis").unwrap();
        let file = ZstdFile::writer(Vec::new(), "w", FileOptions::new()).unwrap();
        let mut text = ZstdTextFile::new(file, sjis, NewlineMode::CrLf);
        text.write_str("日本語\nテキスト\n").unwrap();
        let raw = text.into_inner().unwrap();

        let decoded = crate::decompress(&raw).unwrap();
        let (expected, _, _) = sjis.encode("日本語\r\nテキスト\r\n");
        assert_eq!(decoded, expected.as_ref());

        let mut reader = text_file(raw, sjis, NewlineMode::Universal);
        assert_eq!(reader.read_to_string().unwrap(), "日本語\nテキスト\n");
    }

    #[test]
    fn test_unmappable_is_encoding_error() {
        let latin1 = Encoding::for_label(b"iso-8859-1").unwrap();
        let file = ZstdFile::writer(Vec::new(), "w", FileOptions::new()).unwrap();
        let mut text = ZstdTextFile::new(file, latin1, NewlineMode::Lf);
        let err = text.write_str("snowman ☃").unwrap_err();
        assert!(matches!(err, ZframeError::EncodingError { .. }));
    }

    #[test]
    fn test_open_mode_validation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("modes.zst");
        for mode in ["rw", "bt", "r+t", "tt"] {
            assert!(matches!(
                open(&path, mode, OpenOptions::new()),
                Err(ZframeError::InvalidConfig { .. })
            ));
        }
        let err = open(
            &path,
            "wb",
            OpenOptions::new().with_newline(NewlineMode::Lf),
        )
        .unwrap_err();
        assert!(matches!(err, ZframeError::InvalidConfig { .. }));
        assert!(OpenOptions::new().with_encoding("no-such-encoding").is_err());
    }
}
