//! Writing a finished comic to disk: panel files, page strips, and a script dump.

use anyhow::Context as _;
use comic_core::{ComicResult, ImageAsset};
use image::{ImageFormat, RgbaImage};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Everything written for one comic.
#[derive(Debug, Default)]
pub struct Exported {
    pub panels: Vec<PathBuf>,
    pub pages: Vec<PathBuf>,
    pub strip: Option<PathBuf>,
    pub script: Option<PathBuf>,
}

/// Write `comic` under `dir`: `panel_NN.<ext>`, `page_N.png`, `comic.png`, `comic.json`.
pub fn export(comic: &ComicResult, dir: &Path) -> anyhow::Result<Exported> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("create output dir '{}'", dir.display()))?;

    let mut exported = Exported::default();

    for panel in &comic.panels {
        let path = dir.join(format!(
            "panel_{:02}.{}",
            panel.descriptor.index + 1,
            panel.image.extension()
        ));
        std::fs::write(&path, panel.image.bytes())
            .with_context(|| format!("write panel '{}'", path.display()))?;
        exported.panels.push(path);
    }

    let pages: BTreeSet<u8> = comic.panels.iter().map(|p| p.descriptor.page).collect();
    for page in pages {
        let images: Vec<&ImageAsset> = comic.page(page).map(|p| &p.image).collect();
        let path = dir.join(format!("page_{page}.png"));
        save_png(&stitch_vertical(&images)?, &path)?;
        exported.pages.push(path);
    }

    if !comic.is_empty() {
        let images: Vec<&ImageAsset> = comic.panels.iter().map(|p| &p.image).collect();
        let path = dir.join("comic.png");
        save_png(&stitch_vertical(&images)?, &path)?;
        exported.strip = Some(path);
    }

    let path = dir.join("comic.json");
    let json = serde_json::to_string_pretty(comic).context("serialize comic")?;
    std::fs::write(&path, json).with_context(|| format!("write '{}'", path.display()))?;
    exported.script = Some(path);

    Ok(exported)
}

/// Stack images top to bottom, left-aligned, on a canvas as wide as the widest.
pub fn stitch_vertical(images: &[&ImageAsset]) -> anyhow::Result<RgbaImage> {
    let decoded = images
        .iter()
        .enumerate()
        .map(|(i, asset)| {
            image::load_from_memory(asset.bytes())
                .map(|img| img.to_rgba8())
                .with_context(|| format!("decode image {i}"))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    let width = decoded.iter().map(|img| img.width()).max().unwrap_or(0);
    let height = decoded.iter().map(|img| img.height()).sum();
    anyhow::ensure!(width > 0 && height > 0, "nothing to stitch");

    let mut canvas = RgbaImage::new(width, height);
    let mut y = 0i64;
    for img in &decoded {
        image::imageops::overlay(&mut canvas, img, 0, y);
        y += i64::from(img.height());
    }
    Ok(canvas)
}

fn save_png(image: &RgbaImage, path: &Path) -> anyhow::Result<()> {
    image
        .save_with_format(path, ImageFormat::Png)
        .with_context(|| format!("write png '{}'", path.display()))
}
