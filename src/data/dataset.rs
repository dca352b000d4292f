use burn::data::dataset::Dataset;

use crate::domain::sequence::SequenceSample;

/// One partition of (window, label) samples exposed to Burn's DataLoader.
pub struct WindowDataset {
    samples: Vec<SequenceSample>,
}

impl WindowDataset {
    pub fn new(samples: Vec<SequenceSample>) -> Self { Self { samples } }
}

impl Dataset<SequenceSample> for WindowDataset {
    fn get(&self, index: usize) -> Option<SequenceSample> {
        self.samples.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}
