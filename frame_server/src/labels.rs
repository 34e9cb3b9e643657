//! Label maps from class index to class name.
//!
use std::{fmt, path::Path, str::FromStr};

use anyhow::{bail, Context, Result};

/// The 80 categories of the COCO detection benchmark in model index order.
pub const COCO_CLASSES: [&str; 80] = [
    "person", "bicycle", "car", "motorbike", "aeroplane", "bus", "train", "truck", "boat",
    "traffic light", "fire hydrant", "stop sign", "parking meter", "bench", "bird", "cat",
    "dog", "horse", "sheep", "cow", "elephant", "bear", "zebra", "giraffe", "backpack", "umbrella",
    "handbag", "tie", "suitcase", "frisbee", "skis", "snowboard", "sports ball", "kite",
    "baseball bat", "baseball glove", "skateboard", "surfboard", "tennis racket", "bottle",
    "wine glass", "cup", "fork", "knife", "spoon", "bowl", "banana", "apple", "sandwich", "orange",
    "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair", "sofa", "pottedplant", "bed",
    "diningtable", "toilet", "tvmonitor", "laptop", "mouse", "remote", "keyboard", "cell phone",
    "microwave", "oven", "toaster", "sink", "refrigerator", "book", "clock", "vase", "scissors",
    "teddy bear", "hair drier", "toothbrush",
];

/// Where the label map of the service comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LabelSource {
    /// Hardcoded COCO list.
    Coco,
    /// `names` entry of the model metadata.
    Model,
    /// Text file with one class name per line.
    File(String),
}

impl FromStr for LabelSource {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "coco" => LabelSource::Coco,
            "model" => LabelSource::Model,
            path => LabelSource::File(path.to_owned()),
        })
    }
}

impl fmt::Display for LabelSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LabelSource::Coco => write!(f, "coco"),
            LabelSource::Model => write!(f, "model"),
            LabelSource::File(path) => write!(f, "{path}"),
        }
    }
}

/// Ordered mapping from class index to class name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelMap {
    names: Vec<String>,
}

impl LabelMap {
    pub fn new(names: Vec<String>) -> Result<Self> {
        if names.is_empty() {
            bail!("label map is empty");
        }
        if let Some(index) = names.iter().position(|name| name.trim().is_empty()) {
            bail!("label map has an empty name at index {index}");
        }
        Ok(Self { names })
    }

    pub fn coco() -> Self {
        Self {
            names: COCO_CLASSES.iter().map(|name| name.to_string()).collect(),
        }
    }

    /// Read one class name per line, skipping blank lines.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read label file {}", path.display()))?;
        let names = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_owned)
            .collect();
        Self::new(names)
    }

    /// Parse the `names` metadata that exported YOLO models carry.
    ///
    /// The value is a Python dict literal such as `{0: 'person', 1: 'bicycle'}`. Indices must
    /// cover `0..n` without gaps.
    pub fn from_model_metadata(value: &str) -> Result<Self> {
        let entries = parse_names_dict(value)?;
        let mut names = vec![None; entries.len()];
        for (index, name) in entries {
            match names.get_mut(index) {
                Some(slot) if slot.is_none() => *slot = Some(name),
                Some(_) => bail!("duplicate class index {index} in model names"),
                None => bail!("class index {index} in model names leaves a gap"),
            }
        }
        Self::new(names.into_iter().flatten().collect())
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &str)> {
        self.names.iter().map(String::as_str).enumerate()
    }

    /// Check the map against the class count the model reports.
    pub fn validate(&self, class_count: usize) -> Result<()> {
        if self.names.len() != class_count {
            bail!(
                "label map has {} classes but the model predicts {}",
                self.names.len(),
                class_count
            );
        }
        Ok(())
    }
}

fn parse_names_dict(value: &str) -> Result<Vec<(usize, String)>> {
    let inner = value
        .trim()
        .strip_prefix('{')
        .and_then(|rest| rest.strip_suffix('}'))
        .context("model names are not a dict literal")?;

    let mut entries = Vec::new();
    let mut rest = inner.trim_start();

    while !rest.is_empty() {
        let (index, after_index) = rest
            .split_once(':')
            .context("missing ':' in model names")?;
        let index: usize = index
            .trim()
            .parse()
            .with_context(|| format!("invalid class index {:?}", index.trim()))?;

        let after_index = after_index.trim_start();
        let quote = after_index
            .chars()
            .next()
            .filter(|c| *c == '\'' || *c == '"')
            .context("class name is not quoted")?;
        let after_quote = &after_index[1..];
        let end = after_quote
            .find(quote)
            .context("unterminated class name")?;
        entries.push((index, after_quote[..end].to_owned()));

        rest = after_quote[end + 1..].trim_start();
        rest = rest.strip_prefix(',').unwrap_or(rest).trim_start();
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coco_map_has_80_classes() {
        let labels = LabelMap::coco();
        assert_eq!(labels.len(), 80);
        assert_eq!(labels.get(0), Some("person"));
        assert_eq!(labels.get(79), Some("toothbrush"));
        assert_eq!(labels.get(80), None);
    }

    #[test]
    fn parses_model_metadata() {
        let labels =
            LabelMap::from_model_metadata("{0: 'person', 1: \"traffic light\", 2: 'car'}").unwrap();
        assert_eq!(labels.len(), 3);
        assert_eq!(labels.get(1), Some("traffic light"));
        assert_eq!(labels.get(2), Some("car"));
    }

    #[test]
    fn model_metadata_out_of_order() {
        let labels = LabelMap::from_model_metadata("{1: 'b', 0: 'a'}").unwrap();
        assert_eq!(labels.iter().collect::<Vec<_>>(), vec![(0, "a"), (1, "b")]);
    }

    #[test]
    fn rejects_broken_metadata() {
        assert!(LabelMap::from_model_metadata("[0, 1]").is_err());
        assert!(LabelMap::from_model_metadata("{0: 'a', 2: 'c'}").is_err());
        assert!(LabelMap::from_model_metadata("{0: 'a', 0: 'b'}").is_err());
        assert!(LabelMap::from_model_metadata("{0: person}").is_err());
        assert!(LabelMap::from_model_metadata("{}").is_err());
    }

    #[test]
    fn validates_class_count() {
        let labels = LabelMap::coco();
        assert!(labels.validate(80).is_ok());
        assert!(labels.validate(81).is_err());
        assert!(labels.validate(1).is_err());
    }

    #[test]
    fn reads_label_file() {
        let path = std::env::temp_dir().join(format!("labels-{}.txt", std::process::id()));
        std::fs::write(&path, "cat\n\n dog \n").unwrap();

        let labels = LabelMap::from_file(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(labels.iter().collect::<Vec<_>>(), vec![(0, "cat"), (1, "dog")]);
    }

    #[test]
    fn label_source_from_str() {
        assert_eq!("coco".parse::<LabelSource>().unwrap(), LabelSource::Coco);
        assert_eq!("model".parse::<LabelSource>().unwrap(), LabelSource::Model);
        assert_eq!(
            "labels.txt".parse::<LabelSource>().unwrap(),
            LabelSource::File("labels.txt".into())
        );
    }
}
