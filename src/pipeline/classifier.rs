//! Attachment classification.
//!
//! Splits attachments into images and documents and decides whether a lone
//! image is the backdrop for the other files' QR codes:
//! - exactly one image plus at least one document → image is the background,
//!   only the documents get QR codes
//! - anything else → every attachment gets its own QR code

use tracing::debug;

use crate::pipeline::types::Attachment;

/// Attachments split by kind, each group in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttachmentGroup {
    pub images: Vec<Attachment>,
    pub documents: Vec<Attachment>,
}

impl AttachmentGroup {
    /// Partition attachments into images (JPEG/PNG) and everything else.
    pub fn partition(attachments: Vec<Attachment>) -> Self {
        let (images, documents) = attachments.into_iter().partition(Attachment::is_image);
        Self { images, documents }
    }
}

/// Shared QR background for a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum BackgroundSelection {
    #[default]
    None,
    Image(Attachment),
}

impl BackgroundSelection {
    pub fn image(&self) -> Option<&Attachment> {
        match self {
            Self::None => None,
            Self::Image(a) => Some(a),
        }
    }
}

/// Result of classifying a message's attachments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classification {
    /// Attachments that get an artifact + QR, documents first then images.
    pub selected: Vec<Attachment>,
    pub background: BackgroundSelection,
}

/// Classify attachments into the generation set and an optional background.
pub fn classify(attachments: Vec<Attachment>) -> Classification {
    let AttachmentGroup {
        mut images,
        documents,
    } = AttachmentGroup::partition(attachments);

    debug!(
        images = images.len(),
        documents = documents.len(),
        "Classified attachments"
    );

    if images.len() == 1 && !documents.is_empty() {
        let background = images.remove(0);
        return Classification {
            selected: documents,
            background: BackgroundSelection::Image(background),
        };
    }

    let mut selected = documents;
    selected.extend(images);
    Classification {
        selected,
        background: BackgroundSelection::None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(name: &str) -> Attachment {
        Attachment::new(name, "application/pdf", name.as_bytes().to_vec())
    }

    fn jpeg(name: &str) -> Attachment {
        Attachment::new(name, "image/jpeg", name.as_bytes().to_vec())
    }

    fn png(name: &str) -> Attachment {
        Attachment::new(name, "image/png", name.as_bytes().to_vec())
    }

    fn names(list: &[Attachment]) -> Vec<&str> {
        list.iter().map(|a| a.name.as_str()).collect()
    }

    #[test]
    fn partition_preserves_order_within_groups() {
        let group = AttachmentGroup::partition(vec![
            jpeg("1.jpg"),
            doc("2.pdf"),
            png("3.png"),
            doc("4.pdf"),
        ]);
        assert_eq!(names(&group.images), vec!["1.jpg", "3.png"]);
        assert_eq!(names(&group.documents), vec!["2.pdf", "4.pdf"]);
    }

    #[test]
    fn single_image_with_documents_becomes_background() {
        let c = classify(vec![doc("a.pdf"), jpeg("bg.jpg"), doc("b.pdf")]);
        assert_eq!(names(&c.selected), vec!["a.pdf", "b.pdf"]);
        assert_eq!(c.background.image().map(|a| a.name.as_str()), Some("bg.jpg"));
    }

    #[test]
    fn single_image_alone_gets_its_own_qr() {
        let c = classify(vec![png("only.png")]);
        assert_eq!(names(&c.selected), vec!["only.png"]);
        assert_eq!(c.background, BackgroundSelection::None);
    }

    #[test]
    fn multiple_images_without_documents() {
        let c = classify(vec![jpeg("toos-leen.jpeg"), jpeg("xp-won.jpeg")]);
        assert_eq!(names(&c.selected), vec!["toos-leen.jpeg", "xp-won.jpeg"]);
        assert!(c.background.image().is_none());
    }

    #[test]
    fn multiple_images_with_documents_puts_documents_first() {
        let c = classify(vec![
            jpeg("toos-leen.jpeg"),
            doc("a text file"),
            jpeg("xp-won.jpeg"),
        ]);
        assert_eq!(
            names(&c.selected),
            vec!["a text file", "toos-leen.jpeg", "xp-won.jpeg"]
        );
        assert!(c.background.image().is_none());
    }

    #[test]
    fn documents_only() {
        let c = classify(vec![doc("x.pdf"), doc("y.pdf")]);
        assert_eq!(names(&c.selected), vec!["x.pdf", "y.pdf"]);
        assert!(c.background.image().is_none());
    }

    #[test]
    fn selection_and_background_cover_input_exactly_once() {
        let inputs = [
            vec![doc("a"), jpeg("b")],
            vec![jpeg("a"), jpeg("b"), doc("c")],
            vec![png("a")],
            vec![doc("a"), doc("b"), png("c"), doc("d")],
        ];
        for input in inputs {
            let mut expected = names(&input)
                .into_iter()
                .map(String::from)
                .collect::<Vec<_>>();
            let c = classify(input.clone());
            let mut got: Vec<String> = c.selected.iter().map(|a| a.name.clone()).collect();
            if let Some(bg) = c.background.image() {
                assert!(!c.selected.contains(bg));
                got.push(bg.name.clone());
            }
            expected.sort();
            got.sort();
            assert_eq!(got, expected);
        }
    }
}
