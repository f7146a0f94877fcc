use anyhow::Context;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// COCO category names indexed by the 91 category ids DETR-family exports
/// predict. Ids that COCO never assigned are "N/A".
pub const COCO_LABELS: [&str; 91] = [
    "N/A", "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck", "boat",
    "traffic light", "fire hydrant", "N/A", "stop sign", "parking meter", "bench", "bird", "cat",
    "dog", "horse", "sheep", "cow", "elephant", "bear", "zebra", "giraffe", "N/A", "backpack",
    "umbrella", "N/A", "N/A", "handbag", "tie", "suitcase", "frisbee", "skis", "snowboard",
    "sports ball", "kite", "baseball bat", "baseball glove", "skateboard", "surfboard",
    "tennis racket", "bottle", "N/A", "wine glass", "cup", "fork", "knife", "spoon", "bowl",
    "banana", "apple", "sandwich", "orange", "broccoli", "carrot", "hot dog", "pizza", "donut",
    "cake", "chair", "couch", "potted plant", "bed", "N/A", "dining table", "N/A", "N/A",
    "toilet", "N/A", "tv", "laptop", "mouse", "remote", "keyboard", "cell phone", "microwave",
    "oven", "toaster", "sink", "refrigerator", "N/A", "book", "clock", "vase", "scissors",
    "teddy bear", "hair drier", "toothbrush",
];

/// Class id to human-readable name, fixed for the lifetime of a model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelMap {
    names: HashMap<u32, String>,
}

impl LabelMap {
    pub fn coco() -> Self {
        Self::from_names(COCO_LABELS)
    }

    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names
                .into_iter()
                .enumerate()
                .map(|(id, name)| (id as u32, name.into()))
                .collect(),
        }
    }

    /// Loads labels from a file.
    ///
    /// `.json` files may hold a model config with an `id2label` object or a
    /// plain array of names. Anything else is read as one label per
    /// non-empty line.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read labels from {}", path.display()))?;

        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        let labels = if is_json {
            Self::parse_json(&content)
                .with_context(|| format!("invalid label file {}", path.display()))?
        } else {
            Self::parse_lines(&content)
        };

        if labels.is_empty() {
            anyhow::bail!("label file {} contains no labels", path.display());
        }

        Ok(labels)
    }

    pub fn parse_json(content: &str) -> anyhow::Result<Self> {
        let value: serde_json::Value = serde_json::from_str(content)?;

        if let Some(id2label) = value.get("id2label") {
            let object = id2label
                .as_object()
                .context("`id2label` must be an object")?;
            let mut names = HashMap::with_capacity(object.len());
            for (id, name) in object {
                let id: u32 = id
                    .parse()
                    .with_context(|| format!("label id `{}` is not an integer", id))?;
                let name = name
                    .as_str()
                    .with_context(|| format!("label for id {} is not a string", id))?;
                names.insert(id, name.to_string());
            }
            return Ok(Self { names });
        }

        let array = value
            .as_array()
            .context("expected an `id2label` object or an array of names")?;
        let names = array
            .iter()
            .map(|name| name.as_str().context("label names must be strings"))
            .collect::<anyhow::Result<Vec<_>>>()?;

        Ok(Self::from_names(names))
    }

    pub fn parse_lines(content: &str) -> Self {
        Self::from_names(content.lines().map(str::trim).filter(|line| !line.is_empty()))
    }

    pub fn get(&self, class_id: u32) -> Option<&str> {
        self.names.get(&class_id).map(String::as_str)
    }

    /// Name for `class_id`, or `class_<id>` when the map has no entry.
    pub fn resolve(&self, class_id: u32) -> String {
        self.get(class_id)
            .map(str::to_string)
            .unwrap_or_else(|| format!("class_{}", class_id))
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl Default for LabelMap {
    fn default() -> Self {
        Self::coco()
    }
}
