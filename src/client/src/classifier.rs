// Copyright 2024 The read-until Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::collections::{HashMap, HashSet};

use tracing::debug;

/// Class names treated as strand-like.
const STRAND_CLASSES: [&str; 4] = ["strand", "strand1", "adapter", "unavailable"];

/// Resolves numeric chunk-class codes against the session's classification
/// map. Built once at session start; decisions are stable thereafter.
pub struct Classifier {
    classes: HashMap<i32, String>,
    strand_classes: HashSet<i32>,
}

impl Classifier {
    pub fn new(classes: HashMap<i32, String>) -> Self {
        let strand_classes: HashSet<i32> = classes
            .iter()
            .filter(|(_, name)| STRAND_CLASSES.contains(&name.as_str()))
            .map(|(code, _)| *code)
            .collect();
        debug!(?strand_classes, "strand-like classes");
        Classifier {
            classes,
            strand_classes,
        }
    }

    /// True if any of the chunk's class codes maps to a strand-like name.
    /// Codes absent from the classification map are not strand-like.
    pub fn is_strand_like(&self, classifications: &[i32]) -> bool {
        classifications.iter().any(|code| {
            if self.strand_classes.contains(code) {
                return true;
            }
            if !self.classes.contains_key(code) {
                debug!(code, "unknown read classification");
            }
            false
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> Classifier {
        Classifier::new(HashMap::from([
            (83, "strand".to_string()),
            (67, "strand1".to_string()),
            (77, "multiple".to_string()),
            (65, "adapter".to_string()),
            (85, "unavailable".to_string()),
            (80, "pore".to_string()),
        ]))
    }

    #[test]
    fn strand_like_codes_are_detected() {
        let classifier = classifier();
        assert!(classifier.is_strand_like(&[83]));
        assert!(classifier.is_strand_like(&[67]));
        assert!(classifier.is_strand_like(&[65]));
        assert!(classifier.is_strand_like(&[85]));
    }

    #[test]
    fn any_strand_like_code_suffices() {
        let classifier = classifier();
        assert!(classifier.is_strand_like(&[77, 80, 83]));
    }

    #[test]
    fn non_strand_and_unknown_codes_are_rejected() {
        let classifier = classifier();
        assert!(!classifier.is_strand_like(&[77]));
        assert!(!classifier.is_strand_like(&[80, 77]));
        assert!(!classifier.is_strand_like(&[999]));
        assert!(!classifier.is_strand_like(&[]));
    }
}
