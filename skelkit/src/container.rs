//! Text containers: the content of one locale of a text unit, optionally
//! split into segments.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::fragment::TextFragment;

/// Whether source and target segments of a unit correspond one to one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum AlignmentStatus {
    Aligned,
    #[default]
    NotAligned,
}

/// One uniquely identified segment of a container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Segment {
    pub id: String,
    pub content: TextFragment,
}

/// Content of one locale of a text unit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TextContainer {
    segments: Vec<Segment>,
    segmented: bool,
    alignment: AlignmentStatus,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, String>,
}

impl TextContainer {
    pub fn new(content: TextFragment) -> Self {
        TextContainer {
            segments: vec![Segment {
                id: "0".to_string(),
                content,
            }],
            ..Default::default()
        }
    }

    pub fn from_text(text: &str) -> Self {
        Self::new(TextFragment::from_text(text))
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn segment(&self, id: &str) -> Option<&Segment> {
        self.segments.iter().find(|s| s.id == id)
    }

    pub fn segment_mut(&mut self, id: &str) -> Option<&mut Segment> {
        self.segments.iter_mut().find(|s| s.id == id)
    }

    /// Appends a segment with the next free numeric id and returns the id.
    pub fn append_segment(&mut self, content: TextFragment) -> String {
        let next = self
            .segments
            .iter()
            .filter_map(|s| s.id.parse::<u64>().ok())
            .max()
            .map_or(0, |max| max + 1);
        let id = next.to_string();
        self.segments.push(Segment {
            id: id.clone(),
            content,
        });
        self.segmented = self.segments.len() > 1 || self.segmented;
        id
    }

    /// The first segment, which is the whole content when unsegmented.
    pub fn first_content(&self) -> Option<&TextFragment> {
        self.segments.first().map(|s| &s.content)
    }

    pub fn first_content_mut(&mut self) -> &mut TextFragment {
        if self.segments.is_empty() {
            self.segments.push(Segment {
                id: "0".to_string(),
                content: TextFragment::new(),
            });
        }
        &mut self.segments[0].content
    }

    /// All segments joined into one fragment.
    pub fn unsegmented_content(&self) -> TextFragment {
        match self.segments.as_slice() {
            [single] => single.content.clone(),
            segments => {
                let mut joined = TextFragment::new();
                for segment in segments {
                    joined.append_fragment(&segment.content);
                }
                joined
            }
        }
    }

    /// Replaces all segments with a single one.
    pub fn set_content(&mut self, content: TextFragment) {
        self.segments = vec![Segment {
            id: "0".to_string(),
            content,
        }];
        self.segmented = false;
    }

    pub fn is_segmented(&self) -> bool {
        self.segmented
    }

    pub fn set_segmented(&mut self, segmented: bool) {
        self.segmented = segmented;
    }

    pub fn alignment(&self) -> AlignmentStatus {
        self.alignment
    }

    pub fn set_alignment(&mut self, alignment: AlignmentStatus) {
        self.alignment = alignment;
    }

    pub fn is_empty(&self) -> bool {
        self.segments.iter().all(|s| s.content.is_empty())
    }

    /// Plain text of all segments.
    pub fn text(&self) -> String {
        self.segments.iter().map(|s| s.content.text()).collect()
    }
}
