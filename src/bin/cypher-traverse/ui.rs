use clap::ValueEnum;
use nu_ansi_term::{Color, Style};
use std::fmt::Display;
use std::io::IsTerminal;

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, ValueEnum)]
pub enum ColorChoice {
    #[default]
    Auto,
    Always,
    Never,
}

pub struct Ui {
    palette: Palette,
    paint: bool,
}

impl Ui {
    pub fn new(choice: ColorChoice) -> Self {
        let paint = match choice {
            ColorChoice::Always => true,
            ColorChoice::Never => false,
            ColorChoice::Auto => {
                std::io::stdout().is_terminal() && std::env::var_os("NO_COLOR").is_none()
            }
        };

        #[cfg(windows)]
        if paint {
            let _ = nu_ansi_term::enable_ansi_support();
        }

        let palette = if paint {
            Palette::dark()
        } else {
            Palette::plain()
        };
        Self { palette, paint }
    }

    pub fn section<'a, I, V>(&self, title: &str, rows: I)
    where
        I: IntoIterator<Item = (&'a str, V)>,
        V: Display,
    {
        let rows: Vec<(String, String)> = rows
            .into_iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        if rows.is_empty() {
            return;
        }
        self.heading(title);
        let key_width = rows.iter().map(|(k, _)| k.len()).max().unwrap_or(0);
        for (key, value) in rows {
            println!(
                "  {} {}",
                self.palette.key.paint(format!("{key:>key_width$}:")),
                self.palette.value.paint(value)
            );
        }
    }

    pub fn list<I>(&self, title: &str, entries: I)
    where
        I: IntoIterator<Item = String>,
    {
        let entries: Vec<String> = entries.into_iter().collect();
        self.heading(title);
        if entries.is_empty() {
            println!("  (none)");
            return;
        }
        for entry in entries {
            if self.paint {
                println!("  {} {entry}", self.palette.bullet.paint("•"));
            } else {
                println!("  - {entry}");
            }
        }
    }

    pub fn error(&self, message: &str) {
        eprintln!("{} {message}", self.palette.error.paint("error:"));
    }

    fn heading(&self, title: &str) {
        let formatted = format!("{HEADING_ICON} {title}");
        println!("{}", self.palette.heading.paint(formatted));
    }
}

struct Palette {
    heading: Style,
    key: Style,
    value: Style,
    bullet: Style,
    error: Style,
}

impl Palette {
    fn dark() -> Self {
        Self {
            heading: Style::new().fg(Color::Purple).bold(),
            key: Style::new().fg(Color::LightBlue).bold(),
            value: Style::new().fg(Color::White),
            bullet: Style::new().fg(Color::LightBlue),
            error: Style::new().fg(Color::Red).bold(),
        }
    }

    fn plain() -> Self {
        Self {
            heading: Style::new(),
            key: Style::new(),
            value: Style::new(),
            bullet: Style::new(),
            error: Style::new(),
        }
    }
}

const HEADING_ICON: &str = "▸";
