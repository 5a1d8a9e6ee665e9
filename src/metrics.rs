//! Classification metrics.

/// Fraction of predictions equal to the true label (0 for empty input).
pub fn accuracy(predicted: &[usize], labels: &[u8]) -> f64 {
    if labels.is_empty() {
        return 0.0;
    }
    let correct = predicted
        .iter()
        .zip(labels)
        .filter(|(&p, &l)| p == l as usize)
        .count();
    correct as f64 / labels.len() as f64
}

/// Simple confusion matrix, `cm[true][predicted]`
pub fn confusion_matrix(predicted: &[usize], labels: &[u8], num_classes: usize) -> Vec<Vec<usize>> {
    let mut cm = vec![vec![0; num_classes]; num_classes];
    for (&p, &l) in predicted.iter().zip(labels) {
        let t = l as usize;
        if t < num_classes && p < num_classes {
            cm[t][p] += 1;
        }
    }
    cm
}
