use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, warn};

const ASSET_DIR: &str = "tray";
const GENERATED_SIZE: u32 = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum IconTheme {
    #[default]
    Color,
    White,
    Black,
    Grey,
    Auto,
}

#[derive(Debug, Error)]
#[error("unknown icon theme `{0}`")]
pub struct UnknownTheme(String);

impl IconTheme {
    pub const ALL: [IconTheme; 5] = [
        IconTheme::Color,
        IconTheme::White,
        IconTheme::Black,
        IconTheme::Grey,
        IconTheme::Auto,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            IconTheme::Color => "color",
            IconTheme::White => "white",
            IconTheme::Black => "black",
            IconTheme::Grey => "grey",
            IconTheme::Auto => "auto",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            IconTheme::Color => "Color",
            IconTheme::White => "White",
            IconTheme::Black => "Black",
            IconTheme::Grey => "Grey",
            IconTheme::Auto => "Auto",
        }
    }

    /// The asset actually drawn for this theme. `auto` picks the neutral grey
    /// variant, readable on both light and dark panels.
    pub fn asset_theme(self) -> IconTheme {
        match self {
            IconTheme::Auto => IconTheme::Grey,
            other => other,
        }
    }
}

impl fmt::Display for IconTheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IconTheme {
    type Err = UnknownTheme;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        IconTheme::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownTheme(s.to_string()))
    }
}

/// Decoded RGBA pixels ready to hand to the tray.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IconImage {
    pub rgba: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Outcome of resolving a theme to pixels.
#[derive(Debug)]
pub struct LoadedIcon {
    pub image: IconImage,
    /// The theme that should be persisted. Differs from the requested one
    /// when its asset was missing and the default was used instead.
    pub theme: IconTheme,
}

/// Directories searched for `tray/<theme>.png`, in order.
pub fn asset_dirs() -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    if let Some(exe_dir) = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(Path::to_path_buf))
    {
        dirs.push(exe_dir.join(ASSET_DIR));
    }
    dirs.push(Path::new(env!("CARGO_MANIFEST_DIR")).join(ASSET_DIR));
    dirs
}

pub fn load_icon(theme: IconTheme, search: &[PathBuf]) -> LoadedIcon {
    if let Some(image) = load_asset(theme.asset_theme(), search) {
        return LoadedIcon { image, theme };
    }

    let fallback = IconTheme::default();
    warn!("icon asset for `{theme}` not found, falling back to `{fallback}`");
    let image = load_asset(fallback, search).unwrap_or_else(|| {
        warn!("default icon asset missing too, drawing one");
        generated_icon()
    });
    LoadedIcon {
        image,
        theme: fallback,
    }
}

fn load_asset(theme: IconTheme, search: &[PathBuf]) -> Option<IconImage> {
    let file = format!("{}.png", theme.as_str());
    search.iter().map(|dir| dir.join(&file)).find_map(|path| {
        if !path.is_file() {
            return None;
        }
        match image::open(&path) {
            Ok(img) => {
                debug!("loaded tray icon {}", path.display());
                let rgba = img.into_rgba8();
                let (width, height) = rgba.dimensions();
                Some(IconImage {
                    rgba: rgba.into_raw(),
                    width,
                    height,
                })
            }
            Err(e) => {
                warn!("cannot decode {}: {e}", path.display());
                None
            }
        }
    })
}

/// A plain blue disc, used only when no asset can be found at all.
fn generated_icon() -> IconImage {
    let size = GENERATED_SIZE;
    let center = size as f32 / 2.0;
    let radius = center - 1.0;
    let mut rgba = vec![0u8; (size * size * 4) as usize];

    for y in 0..size {
        for x in 0..size {
            let dx = x as f32 + 0.5 - center;
            let dy = y as f32 + 0.5 - center;
            if (dx * dx + dy * dy).sqrt() <= radius {
                let idx = ((y * size + x) * 4) as usize;
                rgba[idx..idx + 4].copy_from_slice(&[0x2b, 0x6c, 0xe0, 0xff]);
            }
        }
    }

    IconImage {
        rgba,
        width: size,
        height: size,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn write_png(dir: &Path, name: &str) {
        let img = image::RgbaImage::from_pixel(4, 4, image::Rgba([1, 2, 3, 255]));
        img.save(dir.join(format!("{name}.png"))).unwrap();
    }

    #[rstest]
    #[case("color", IconTheme::Color)]
    #[case("Grey", IconTheme::Grey)]
    #[case(" auto ", IconTheme::Auto)]
    fn parses_theme_names(#[case] raw: &str, #[case] expected: IconTheme) {
        assert_eq!(raw.parse::<IconTheme>().unwrap(), expected);
    }

    #[test]
    fn rejects_unknown_theme() {
        assert!("purple".parse::<IconTheme>().is_err());
    }

    #[test]
    fn loads_requested_asset() {
        let dir = tempfile::tempdir().unwrap();
        write_png(dir.path(), "black");

        let loaded = load_icon(IconTheme::Black, &[dir.path().to_path_buf()]);

        assert_eq!(loaded.theme, IconTheme::Black);
        assert_eq!((loaded.image.width, loaded.image.height), (4, 4));
    }

    #[test]
    fn auto_uses_grey_asset() {
        let dir = tempfile::tempdir().unwrap();
        write_png(dir.path(), "grey");

        let loaded = load_icon(IconTheme::Auto, &[dir.path().to_path_buf()]);

        assert_eq!(loaded.theme, IconTheme::Auto);
    }

    #[test]
    fn missing_asset_falls_back_to_default_theme() {
        let dir = tempfile::tempdir().unwrap();
        write_png(dir.path(), "color");

        let loaded = load_icon(IconTheme::White, &[dir.path().to_path_buf()]);

        assert_eq!(loaded.theme, IconTheme::Color);
        assert_eq!(loaded.image.width, 4);
    }

    #[test]
    fn nothing_on_disk_still_yields_an_icon() {
        let dir = tempfile::tempdir().unwrap();

        let loaded = load_icon(IconTheme::Grey, &[dir.path().to_path_buf()]);

        assert_eq!(loaded.theme, IconTheme::Color);
        assert_eq!(loaded.image.width, GENERATED_SIZE);
        assert_eq!(
            loaded.image.rgba.len(),
            (GENERATED_SIZE * GENERATED_SIZE * 4) as usize
        );
    }
}
