use std::path::{Path, PathBuf};

use image::DynamicImage;

pub use ocr_rs::OcrEngine;

#[derive(Debug, thiserror::Error)]
pub enum OcrError {
    #[error("engine initialization failed: {message}")]
    EngineInit { message: String },
    #[error("recognition failed: {message}")]
    Recognition { message: String },
}

pub type OcrResult<T> = Result<T, OcrError>;

const SYSTEM_MODEL_DIR: &str = "/usr/share/cardloft/models";
const DETECTION_MODEL: &str = "PP-OCRv5_mobile_det.mnn";

/// Language hint handed to the recognizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OcrLanguage {
    English,
    Latin,
    Cyrillic,
    Greek,
    Korean,
    Chinese,
}

impl OcrLanguage {
    fn rec_model_filename(self) -> &'static str {
        match self {
            Self::English => "en_PP-OCRv5_mobile_rec_infer.mnn",
            Self::Latin => "latin_PP-OCRv5_mobile_rec_infer.mnn",
            Self::Cyrillic => "cyrillic_PP-OCRv5_mobile_rec_infer.mnn",
            Self::Greek => "el_PP-OCRv5_mobile_rec_infer.mnn",
            Self::Korean => "korean_PP-OCRv5_mobile_rec_infer.mnn",
            Self::Chinese => "PP-OCRv5_mobile_rec.mnn",
        }
    }

    fn keys_filename(self) -> &'static str {
        match self {
            Self::English => "ppocr_keys_en.txt",
            Self::Latin => "ppocr_keys_latin.txt",
            Self::Cyrillic => "ppocr_keys_cyrillic.txt",
            Self::Greek => "ppocr_keys_el.txt",
            Self::Korean => "ppocr_keys_korean.txt",
            Self::Chinese => "ppocr_keys_v5.txt",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::English => "en",
            Self::Latin => "latin",
            Self::Cyrillic => "cyrillic",
            Self::Greek => "el",
            Self::Korean => "korean",
            Self::Chinese => "chinese",
        }
    }
}

/// Accepts both short codes and the three-letter `eng` style.
pub fn parse_ocr_language(value: &str) -> Option<OcrLanguage> {
    match value.to_ascii_lowercase().as_str() {
        "en" | "eng" | "english" => Some(OcrLanguage::English),
        "latin" | "lat" => Some(OcrLanguage::Latin),
        "cyrillic" | "ru" | "rus" => Some(OcrLanguage::Cyrillic),
        "el" | "ell" | "greek" => Some(OcrLanguage::Greek),
        "korean" | "ko" | "kor" => Some(OcrLanguage::Korean),
        "chinese" | "zh" | "chi_sim" => Some(OcrLanguage::Chinese),
        _ => None,
    }
}

pub fn detect_system_ocr_language() -> OcrLanguage {
    language_for_locale(&std::env::var("LANG").unwrap_or_default())
}

fn language_for_locale(locale: &str) -> OcrLanguage {
    match locale.split('_').next().unwrap_or("en") {
        "ru" | "uk" | "be" => OcrLanguage::Cyrillic,
        "el" => OcrLanguage::Greek,
        "ko" => OcrLanguage::Korean,
        "zh" => OcrLanguage::Chinese,
        "fr" | "es" | "it" | "pt" | "de" | "nl" => OcrLanguage::Latin,
        _ => OcrLanguage::English,
    }
}

/// Config value first, then the system locale.
pub fn resolve_ocr_language(config_value: Option<&str>) -> OcrLanguage {
    config_value
        .and_then(parse_ocr_language)
        .unwrap_or_else(detect_system_ocr_language)
}

pub fn resolve_model_dir() -> Option<PathBuf> {
    let user_dir = std::env::var("XDG_DATA_HOME")
        .ok()
        .filter(|val| !val.is_empty())
        .map(PathBuf::from)
        .or_else(|| {
            std::env::var("HOME")
                .ok()
                .map(|home| PathBuf::from(home).join(".local/share"))
        })
        .map(|base| base.join("cardloft/models"));

    if let Some(dir) = user_dir.filter(|dir| dir.is_dir()) {
        return Some(dir);
    }

    let system_dir = PathBuf::from(SYSTEM_MODEL_DIR);
    system_dir.is_dir().then_some(system_dir)
}

pub fn create_engine(model_dir: &Path, language: OcrLanguage) -> OcrResult<OcrEngine> {
    let det_path = model_dir.join(DETECTION_MODEL);
    let rec_path = model_dir.join(language.rec_model_filename());
    let keys_path = model_dir.join(language.keys_filename());

    OcrEngine::new(
        det_path.to_str().unwrap_or_default(),
        rec_path.to_str().unwrap_or_default(),
        keys_path.to_str().unwrap_or_default(),
        None,
    )
    .map_err(|err| OcrError::EngineInit {
        message: err.to_string(),
    })
}

/// Recognized lines joined top to bottom; empty when nothing was found.
pub fn recognize_text(engine: &OcrEngine, image: &DynamicImage) -> OcrResult<String> {
    let results = engine
        .recognize(image)
        .map_err(|err| OcrError::Recognition {
            message: err.to_string(),
        })?;

    let mut lines: Vec<_> = results
        .into_iter()
        .map(|r| (r.bbox.rect.top(), r.text))
        .collect();
    lines.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

    Ok(lines
        .into_iter()
        .map(|(_, text)| text)
        .collect::<Vec<_>>()
        .join("\n"))
}

/// Best-effort text recognition over a captured frame.
///
/// Implementations are moved onto a worker thread for each recognition and
/// handed back with the result.
pub trait TextRecognizer: Send {
    fn recognize(&mut self, frame: &DynamicImage, language: OcrLanguage) -> OcrResult<String>;
}

/// Paddle OCR engine, created on first use for the requested language.
#[derive(Default)]
pub struct PaddleRecognizer {
    engine: Option<(OcrLanguage, OcrEngine)>,
    model_dir: Option<PathBuf>,
}

impl PaddleRecognizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_model_dir(model_dir: PathBuf) -> Self {
        Self {
            engine: None,
            model_dir: Some(model_dir),
        }
    }

    fn engine_for(&mut self, language: OcrLanguage) -> OcrResult<&OcrEngine> {
        let reusable = matches!(&self.engine, Some((loaded, _)) if *loaded == language);
        if !reusable {
            let model_dir = self
                .model_dir
                .clone()
                .or_else(resolve_model_dir)
                .ok_or_else(|| OcrError::EngineInit {
                    message: "model directory not found".to_string(),
                })?;
            tracing::info!(
                language = language.as_str(),
                dir = %model_dir.display(),
                "loading OCR engine"
            );
            self.engine = Some((language, create_engine(&model_dir, language)?));
        }
        match &self.engine {
            Some((_, engine)) => Ok(engine),
            None => Err(OcrError::EngineInit {
                message: "engine unavailable".to_string(),
            }),
        }
    }
}

impl TextRecognizer for PaddleRecognizer {
    fn recognize(&mut self, frame: &DynamicImage, language: OcrLanguage) -> OcrResult<String> {
        let engine = self.engine_for(language)?;
        recognize_text(engine, frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_ocr_language_accepts_known_values() {
        assert_eq!(parse_ocr_language("eng"), Some(OcrLanguage::English));
        assert_eq!(parse_ocr_language("EN"), Some(OcrLanguage::English));
        assert_eq!(parse_ocr_language("latin"), Some(OcrLanguage::Latin));
        assert_eq!(parse_ocr_language("ru"), Some(OcrLanguage::Cyrillic));
        assert_eq!(parse_ocr_language("kor"), Some(OcrLanguage::Korean));
    }

    #[test]
    fn parse_ocr_language_returns_none_for_unknown() {
        assert_eq!(parse_ocr_language("klingon"), None);
        assert_eq!(parse_ocr_language(""), None);
    }

    #[test]
    fn locale_maps_to_script() {
        assert_eq!(language_for_locale("en_US.UTF-8"), OcrLanguage::English);
        assert_eq!(language_for_locale("de_DE.UTF-8"), OcrLanguage::Latin);
        assert_eq!(language_for_locale("uk_UA.UTF-8"), OcrLanguage::Cyrillic);
        assert_eq!(language_for_locale(""), OcrLanguage::English);
    }

    #[test]
    fn resolve_ocr_language_prefers_config() {
        assert_eq!(resolve_ocr_language(Some("greek")), OcrLanguage::Greek);
    }
}
