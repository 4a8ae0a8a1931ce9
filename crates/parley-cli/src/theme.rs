use crossterm::style::Color;

const fn rgb(r: u8, g: u8, b: u8) -> Color {
    Color::Rgb { r, g, b }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Theme {
    pub name: &'static str,
    pub fg: Color,
    pub accent: Color,
    pub muted: Color,
    pub success: Color,
    pub error: Color,
    pub warning: Color,
    pub user_color: Color,
    pub assistant_color: Color,
    pub system_color: Color,
    pub code_color: Color,
    pub border: Color,
    /// Name of the bundled syntect theme used for code blocks.
    pub syntax_theme: &'static str,
}

impl Theme {
    pub fn dark() -> Self {
        Self {
            name: "dark",
            fg: rgb(220, 220, 220),
            accent: rgb(122, 162, 247),
            muted: rgb(100, 100, 100),
            success: rgb(158, 206, 106),
            error: rgb(247, 118, 142),
            warning: rgb(224, 175, 104),
            user_color: Color::Cyan,
            assistant_color: Color::Green,
            system_color: Color::Yellow,
            code_color: Color::DarkGrey,
            border: rgb(90, 90, 90),
            syntax_theme: "base16-ocean.dark",
        }
    }

    pub fn tokyo_night() -> Self {
        Self {
            name: "tokyo-night",
            fg: rgb(169, 177, 214),
            accent: rgb(122, 162, 247),
            muted: rgb(86, 95, 137),
            success: rgb(158, 206, 106),
            error: rgb(247, 118, 142),
            warning: rgb(224, 175, 104),
            user_color: rgb(122, 162, 247),
            assistant_color: rgb(158, 206, 106),
            system_color: rgb(224, 175, 104),
            code_color: rgb(86, 95, 137),
            border: rgb(65, 72, 104),
            syntax_theme: "base16-eighties.dark",
        }
    }

    pub fn dracula() -> Self {
        Self {
            name: "dracula",
            fg: rgb(248, 248, 242),
            accent: rgb(255, 121, 198),
            muted: rgb(98, 114, 164),
            success: rgb(80, 250, 123),
            error: rgb(255, 85, 85),
            warning: rgb(241, 250, 140),
            user_color: rgb(139, 233, 253),
            assistant_color: rgb(80, 250, 123),
            system_color: rgb(241, 250, 140),
            code_color: rgb(98, 114, 164),
            border: rgb(68, 71, 90),
            syntax_theme: "base16-mocha.dark",
        }
    }

    /// Look up a theme. Unknown names yield `None`.
    pub fn by_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "dark" => Some(Self::dark()),
            "tokyo-night" | "tokyonight" => Some(Self::tokyo_night()),
            "dracula" => Some(Self::dracula()),
            _ => None,
        }
    }

    pub fn all_names() -> &'static [&'static str] {
        &["dark", "tokyo-night", "dracula"]
    }
}

impl Default for Theme {
    fn default() -> Self {
        Self::dark()
    }
}
