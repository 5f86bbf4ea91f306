//! Single-byte code pages used by the RP6502 console
//!
//! The device reports its active code page as a number. Bytes below 0x80
//! are always ASCII; the upper half comes from the table for that page.
//! Positions a page leaves undefined hold `UNDEFINED` and never map.

/// Placeholder for table slots with no character
const UNDEFINED: char = '\u{FFFD}';

/// CP437 upper half (US)
const CP437_HIGH: &str = concat!(
    "ÇüéâäàåçêëèïîìÄÅ",
    "ÉæÆôöòûùÿÖÜ¢£¥₧ƒ",
    "áíóúñÑªº¿⌐¬½¼¡«»",
    "░▒▓│┤╡╢╖╕╣║╗╝╜╛┐",
    "└┴┬├─┼╞╟╚╔╩╦╠═╬╧",
    "╨╤╥╙╘╒╓╫╪┘┌█▄▌▐▀",
    "αßΓπΣσµτΦΘΩδ∞φε∩",
    "≡±≥≤⌠⌡÷≈°∙·√ⁿ²■\u{00A0}",
);

/// CP720 upper half (Arabic)
const CP720_HIGH: &str = concat!(
    "\u{FFFD}\u{FFFD}éâ\u{FFFD}à\u{FFFD}çêëèïî\u{FFFD}\u{FFFD}\u{FFFD}",
    "\u{FFFD}\u{0651}\u{0652}ô¤\u{0640}ûù\u{0621}\u{0622}\u{0623}\u{0624}£\u{0625}\u{0626}\u{0627}",
    "\u{0628}\u{0629}\u{062A}\u{062B}\u{062C}\u{062D}\u{062E}\u{062F}\u{0630}\u{0631}\u{0632}\u{0633}\u{0634}\u{0635}«»",
    "░▒▓│┤╡╢╖╕╣║╗╝╜╛┐",
    "└┴┬├─┼╞╟╚╔╩╦╠═╬╧",
    "╨╤╥╙╘╒╓╫╪┘┌█▄▌▐▀",
    "\u{0636}\u{0637}\u{0638}\u{0639}\u{063A}\u{0641}µ\u{0642}\u{0643}\u{0644}\u{0645}\u{0646}\u{0647}\u{0648}\u{0649}\u{064A}",
    "≡\u{064B}\u{064C}\u{064D}\u{064E}\u{064F}\u{0650}≈°∙·√ⁿ²■\u{00A0}",
);

/// CP737 upper half (Greek)
const CP737_HIGH: &str = concat!(
    "ΑΒΓΔΕΖΗΘΙΚΛΜΝΞΟΠ",
    "ΡΣΤΥΦΧΨΩαβγδεζηθ",
    "ικλμνξοπρσςτυφχψ",
    "░▒▓│┤╡╢╖╕╣║╗╝╜╛┐",
    "└┴┬├─┼╞╟╚╔╩╦╠═╬╧",
    "╨╤╥╙╘╒╓╫╪┘┌█▄▌▐▀",
    "ωάέήϊίόύϋώΆΈΉΊΌΎ",
    "Ώ±≥≤ΪΫ÷≈°∙·√ⁿ²■\u{00A0}",
);

/// CP775 upper half (Baltic Rim)
const CP775_HIGH: &str = concat!(
    "ĆüéāäģåćłēŖŗīŹÄÅ",
    "ÉæÆōöĢ¢ŚśÖÜø£Ø×¤",
    "ĀĪóŻżź”¦©®¬½¼Ł«»",
    "░▒▓│┤ĄČĘĖ╣║╗╝ĮŠ┐",
    "└┴┬├─┼ŲŪ╚╔╩╦╠═╬Ž",
    "ąčęėįšųūž┘┌█▄▌▐▀",
    "ÓßŌŃõÕµńĶķĻļņĒŅ’",
    "\u{00AD}±“¾¶§÷„°∙·¹³²■\u{00A0}",
);

/// CP850 upper half (Western Europe)
const CP850_HIGH: &str = concat!(
    "ÇüéâäàåçêëèïîìÄÅ",
    "ÉæÆôöòûùÿÖÜø£Ø×ƒ",
    "áíóúñÑªº¿®¬½¼¡«»",
    "░▒▓│┤ÁÂÀ©╣║╗╝¢¥┐",
    "└┴┬├─┼ãÃ╚╔╩╦╠═╬¤",
    "ðÐÊËÈıÍÎÏ┘┌█▄¦Ì▀",
    "ÓßÔÒõÕµþÞÚÛÙýÝ¯´",
    "\u{00AD}±‗¾¶§÷¸°¨·¹³²■\u{00A0}",
);

/// CP852 upper half (Central Europe)
const CP852_HIGH: &str = concat!(
    "ÇüéâäůćçłëŐőîŹÄĆ",
    "ÉĹĺôöĽľŚśÖÜŤťŁ×č",
    "áíóúĄąŽžĘę¬źČş«»",
    "░▒▓│┤ÁÂĚŞ╣║╗╝Żż┐",
    "└┴┬├─┼Ăă╚╔╩╦╠═╬¤",
    "đĐĎËďŇÍÎě┘┌█▄ŢŮ▀",
    "ÓßÔŃńňŠšŔÚŕŰýÝţ´",
    "\u{00AD}˝˛ˇ˘§÷¸°¨˙űŘř■\u{00A0}",
);

/// CP855 upper half (Cyrillic)
const CP855_HIGH: &str = concat!(
    "ђЂѓЃёЁєЄѕЅіІїЇјЈ",
    "љЉњЊћЋќЌўЎџЏюЮъЪ",
    "аАбБцЦдДеЕфФгГ«»",
    "░▒▓│┤хХиИ╣║╗╝йЙ┐",
    "└┴┬├─┼кК╚╔╩╦╠═╬¤",
    "лЛмМнНоОп┘┌█▄Пя▀",
    "ЯрРсСтТуУжЖвВьЬ№",
    "\u{00AD}ыЫзЗшШэЭщЩчЧ§■\u{00A0}",
);

/// CP857 upper half (Turkish)
const CP857_HIGH: &str = concat!(
    "ÇüéâäàåçêëèïîıÄÅ",
    "ÉæÆôöòûùİÖÜø£ØŞş",
    "áíóúñÑĞğ¿®¬½¼¡«»",
    "░▒▓│┤ÁÂÀ©╣║╗╝¢¥┐",
    "└┴┬├─┼ãÃ╚╔╩╦╠═╬¤",
    "ºªÊËÈ\u{FFFD}ÍÎÏ┘┌█▄¦Ì▀",
    "ÓßÔÒõÕµ\u{FFFD}×ÚÛÙìÿ¯´",
    "\u{00AD}±\u{FFFD}¾¶§÷¸°¨·¹³²■\u{00A0}",
);

/// CP860 upper half (Portuguese)
const CP860_HIGH: &str = concat!(
    "ÇüéâãàÁçêÊèÍÔìÃÂ",
    "ÉÀÈôõòÚùÌÕÜ¢£Ù₧Ó",
    "áíóúñÑªº¿Ò¬½¼¡«»",
    "░▒▓│┤╡╢╖╕╣║╗╝╜╛┐",
    "└┴┬├─┼╞╟╚╔╩╦╠═╬╧",
    "╨╤╥╙╘╒╓╫╪┘┌█▄▌▐▀",
    "αßΓπΣσµτΦΘΩδ∞φε∩",
    "≡±≥≤⌠⌡÷≈°∙·√ⁿ²■\u{00A0}",
);

/// CP861 upper half (Icelandic)
const CP861_HIGH: &str = concat!(
    "ÇüéâäàåçêëèÐðÞÄÅ",
    "ÉæÆôöþûÝýÖÜø£Ø₧ƒ",
    "áíóúÁÍÓÚ¿⌐¬½¼¡«»",
    "░▒▓│┤╡╢╖╕╣║╗╝╜╛┐",
    "└┴┬├─┼╞╟╚╔╩╦╠═╬╧",
    "╨╤╥╙╘╒╓╫╪┘┌█▄▌▐▀",
    "αßΓπΣσµτΦΘΩδ∞φε∩",
    "≡±≥≤⌠⌡÷≈°∙·√ⁿ²■\u{00A0}",
);

/// CP862 upper half (Hebrew)
const CP862_HIGH: &str = concat!(
    "\u{05D0}\u{05D1}\u{05D2}\u{05D3}\u{05D4}\u{05D5}\u{05D6}\u{05D7}\u{05D8}\u{05D9}\u{05DA}\u{05DB}\u{05DC}\u{05DD}\u{05DE}\u{05DF}",
    "\u{05E0}\u{05E1}\u{05E2}\u{05E3}\u{05E4}\u{05E5}\u{05E6}\u{05E7}\u{05E8}\u{05E9}\u{05EA}¢£¥₧ƒ",
    "áíóúñÑªº¿⌐¬½¼¡«»",
    "░▒▓│┤╡╢╖╕╣║╗╝╜╛┐",
    "└┴┬├─┼╞╟╚╔╩╦╠═╬╧",
    "╨╤╥╙╘╒╓╫╪┘┌█▄▌▐▀",
    "αßΓπΣσµτΦΘΩδ∞φε∩",
    "≡±≥≤⌠⌡÷≈°∙·√ⁿ²■\u{00A0}",
);

/// CP863 upper half (Canadian French)
const CP863_HIGH: &str = concat!(
    "ÇüéâÂà¶çêëèïî‗À§",
    "ÉÈÊôËÏûù¤ÔÜ¢£ÙÛƒ",
    "¦´óú¨¸³¯Î⌐¬½¼¾«»",
    "░▒▓│┤╡╢╖╕╣║╗╝╜╛┐",
    "└┴┬├─┼╞╟╚╔╩╦╠═╬╧",
    "╨╤╥╙╘╒╓╫╪┘┌█▄▌▐▀",
    "αßΓπΣσµτΦΘΩδ∞φε∩",
    "≡±≥≤⌠⌡÷≈°∙·√ⁿ²■\u{00A0}",
);

/// CP864 upper half (Arabic)
const CP864_HIGH: &str = concat!(
    "°·∙√▒─│┼┤┬├┴┐┌└┘",
    "β∞φ±½¼≈«»\u{FEF7}\u{FEF8}\u{FFFD}\u{FFFD}\u{FEFB}\u{FEFC}\u{FFFD}",
    "\u{00A0}\u{00AD}\u{FE82}£¤\u{FE84}\u{FFFD}\u{FFFD}\u{FE8E}\u{FE8F}\u{FE95}\u{FE99}،\u{FE9D}\u{FEA1}\u{FEA5}",
    "\u{0660}\u{0661}\u{0662}\u{0663}\u{0664}\u{0665}\u{0666}\u{0667}\u{0668}\u{0669}\u{FED1}\u{061B}\u{FEB1}\u{FEB5}\u{FEB9}\u{061F}",
    "¢\u{FE80}\u{FE81}\u{FE83}\u{FE85}\u{FECA}\u{FE8B}\u{FE8D}\u{FE91}\u{FE93}\u{FE97}\u{FE9B}\u{FE9F}\u{FEA3}\u{FEA7}\u{FEA9}",
    "\u{FEAB}\u{FEAD}\u{FEAF}\u{FEB3}\u{FEB7}\u{FEBB}\u{FEBF}\u{FEC1}\u{FEC5}\u{FECB}\u{FECF}¦¬÷×\u{FEC9}",
    "\u{0640}\u{FED3}\u{FED7}\u{FEDB}\u{FEDF}\u{FEE3}\u{FEE7}\u{FEEB}\u{FEED}\u{FEEF}\u{FEF3}\u{FEBD}\u{FECC}\u{FECE}\u{FECD}\u{FEE1}",
    "\u{FE7D}\u{0651}\u{FEE5}\u{FEE9}\u{FEEC}\u{FEF0}\u{FEF2}\u{FED0}\u{FED5}\u{FEF5}\u{FEF6}\u{FEDD}\u{FED9}\u{FEF1}■\u{FFFD}",
);

/// CP865 upper half (Nordic)
const CP865_HIGH: &str = concat!(
    "ÇüéâäàåçêëèïîìÄÅ",
    "ÉæÆôöòûùÿÖÜø£Ø₧ƒ",
    "áíóúñÑªº¿⌐¬½¼¡«¤",
    "░▒▓│┤╡╢╖╕╣║╗╝╜╛┐",
    "└┴┬├─┼╞╟╚╔╩╦╠═╬╧",
    "╨╤╥╙╘╒╓╫╪┘┌█▄▌▐▀",
    "αßΓπΣσµτΦΘΩδ∞φε∩",
    "≡±≥≤⌠⌡÷≈°∙·√ⁿ²■\u{00A0}",
);

/// CP866 upper half (Russian)
const CP866_HIGH: &str = concat!(
    "АБВГДЕЖЗИЙКЛМНОП",
    "РСТУФХЦЧШЩЪЫЬЭЮЯ",
    "абвгдежзийклмноп",
    "░▒▓│┤╡╢╖╕╣║╗╝╜╛┐",
    "└┴┬├─┼╞╟╚╔╩╦╠═╬╧",
    "╨╤╥╙╘╒╓╫╪┘┌█▄▌▐▀",
    "рстуфхцчшщъыьэюя",
    "ЁёЄєЇїЎў°∙·√№¤■\u{00A0}",
);

/// CP869 upper half (Greek)
const CP869_HIGH: &str = concat!(
    "\u{FFFD}\u{FFFD}\u{FFFD}\u{FFFD}\u{FFFD}\u{FFFD}Ά\u{FFFD}·¬¦‘’Έ―Ή",
    "ΊΪΌ\u{FFFD}\u{FFFD}ΎΫ©Ώ²³ά£έήί",
    "ϊΐόύΑΒΓΔΕΖΗ½ΘΙ«»",
    "░▒▓│┤ΚΛΜΝ╣║╗╝ΞΟ┐",
    "└┴┬├─┼ΠΡ╚╔╩╦╠═╬Σ",
    "ΤΥΦΧΨΩαβγ┘┌█▄δε▀",
    "ζηθικλμνξοπρσςτ΄",
    "\u{00AD}±υφχ§ψ΅°¨ωϋΰώ■\u{00A0}",
);

/// OEM pages the RIA firmware can switch to
const TABLES: &[(&str, &str)] = &[
    ("437", CP437_HIGH),
    ("720", CP720_HIGH),
    ("737", CP737_HIGH),
    ("775", CP775_HIGH),
    ("850", CP850_HIGH),
    ("852", CP852_HIGH),
    ("855", CP855_HIGH),
    ("857", CP857_HIGH),
    ("860", CP860_HIGH),
    ("861", CP861_HIGH),
    ("862", CP862_HIGH),
    ("863", CP863_HIGH),
    ("864", CP864_HIGH),
    ("865", CP865_HIGH),
    ("866", CP866_HIGH),
    ("869", CP869_HIGH),
];

/// A byte <-> character table
#[derive(Debug, Clone)]
pub struct CodePage {
    name: String,
    high: Vec<char>,
}

impl Default for CodePage {
    fn default() -> Self {
        Self::by_name("cp437")
    }
}

impl CodePage {
    /// Look up a code page by name (`cp437`, `437`, `CP850`, ...).
    /// Unknown pages map ASCII only.
    pub fn by_name(name: &str) -> Self {
        let lower = name.trim().to_lowercase();
        let number = lower.strip_prefix("cp").unwrap_or(&lower);
        let high: Vec<char> = TABLES
            .iter()
            .find(|(page, _)| *page == number)
            .map(|(_, table)| table.chars().collect())
            .unwrap_or_default();
        Self {
            name: format!("cp{}", number),
            high,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Is the upper half of this page known?
    pub fn is_supported(&self) -> bool {
        !self.high.is_empty()
    }

    pub fn decode_byte(&self, byte: u8) -> Option<char> {
        if byte < 0x80 {
            Some(byte as char)
        } else {
            self.high
                .get((byte - 0x80) as usize)
                .copied()
                .filter(|&ch| ch != UNDEFINED)
        }
    }

    /// Decode device output. Bytes without a mapping become `\xHH`.
    pub fn decode(&self, bytes: &[u8]) -> String {
        let mut out = String::with_capacity(bytes.len());
        for &byte in bytes {
            match self.decode_byte(byte) {
                Some(ch) => out.push(ch),
                None => out.push_str(&format!("\\x{:02X}", byte)),
            }
        }
        out
    }

    pub fn encode_char(&self, ch: char) -> Option<u8> {
        if ch.is_ascii() {
            return Some(ch as u8);
        }
        if ch == UNDEFINED {
            return None;
        }
        self.high
            .iter()
            .position(|&c| c == ch)
            .map(|index| 0x80 + index as u8)
    }

    /// Encode text for the device, or `None` if any character has no byte
    pub fn encode(&self, text: &str) -> Option<Vec<u8>> {
        text.chars().map(|ch| self.encode_char(ch)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tables_are_complete() {
        for (page, table) in TABLES {
            assert_eq!(table.chars().count(), 128, "cp{}", page);
        }
    }

    #[test]
    fn test_by_name() {
        assert_eq!(CodePage::by_name("437").name(), "cp437");
        assert_eq!(CodePage::by_name("CP850").name(), "cp850");
        assert!(CodePage::by_name("cp850").is_supported());
        assert!(CodePage::by_name("866").is_supported());
        assert!(!CodePage::by_name("cp771").is_supported());
    }

    #[test]
    fn test_decode() {
        let cp = CodePage::by_name("cp437");
        assert_eq!(cp.decode(b"READY\r\n"), "READY\r\n");
        assert_eq!(cp.decode(&[0x80, 0xB3, 0xE1]), "Ç│ß");

        let cp = CodePage::by_name("cp850");
        assert_eq!(cp.decode(&[0x9B, 0xA9]), "ø®");
    }

    #[test]
    fn test_decode_unknown_bytes_as_hex() {
        let cp = CodePage::by_name("cp771");
        assert_eq!(cp.decode(&[b'A', 0x80, 0xFF]), "A\\x80\\xFF");

        // Holes in a known page
        let cp = CodePage::by_name("cp857");
        assert_eq!(cp.decode(&[0xD5, 0x80]), "\\xD5Ç");
        assert_eq!(cp.encode_char(UNDEFINED), None);
    }

    #[test]
    fn test_encode() {
        let cp = CodePage::by_name("cp437");
        assert_eq!(cp.encode("10 PRINT \"é\""), Some(b"10 PRINT \"\x82\"".to_vec()));
        assert_eq!(cp.encode("ø"), None);
        assert_eq!(CodePage::by_name("cp850").encode("ø"), Some(vec![0x9B]));
    }

    #[test]
    fn test_other_oem_pages() {
        let cp = CodePage::by_name("cp866");
        assert_eq!(cp.decode(&[0x80, 0xAF, 0xE0, 0xF0]), "АпрЁ");
        assert_eq!(
            cp.encode("Привет"),
            Some(vec![0x8F, 0xE0, 0xA8, 0xA2, 0xA5, 0xE2])
        );

        let cp = CodePage::by_name("852");
        assert_eq!(cp.decode(&[0x9F, 0xA5, 0xD8]), "čąě");
        assert_eq!(cp.encode("ů"), Some(vec![0x85]));

        // C1 slots of cp720 are not characters
        assert_eq!(CodePage::by_name("cp720").decode(&[0x80]), "\\x80");
    }
}
