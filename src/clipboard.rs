use std::borrow::Cow;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use arboard::Clipboard;
use image::RgbaImage;

pub fn read_image_from_clipboard() -> Result<Option<RgbaImage>> {
    let mut clipboard = Clipboard::new().context("cannot initialize clipboard")?;
    let image = match clipboard.get_image() {
        Ok(data) => data,
        Err(err) => {
            log::debug!("no image on clipboard: {err}");
            return Ok(None);
        }
    };

    let width = image.width as u32;
    let height = image.height as u32;
    let rgba = RgbaImage::from_raw(width, height, image.bytes.into_owned())
        .ok_or_else(|| anyhow!("clipboard image has invalid shape"))?;
    Ok(Some(rgba))
}

pub fn read_image_from_path(path: &Path) -> Result<RgbaImage> {
    let image = image::open(path)
        .with_context(|| format!("cannot decode image {}", path.display()))?;
    Ok(image.to_rgba8())
}

pub fn write_image_to_clipboard(image: &RgbaImage) -> Result<()> {
    let mut clipboard = Clipboard::new().context("cannot initialize clipboard")?;
    clipboard
        .set_image(arboard::ImageData {
            width: image.width() as usize,
            height: image.height() as usize,
            bytes: Cow::Borrowed(image.as_raw()),
        })
        .context("cannot write image to clipboard")
}
