/// Cosine similarity of two dense vectors; zero for mismatched or zero vectors.
#[must_use]
pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a <= f32::EPSILON || norm_b <= f32::EPSILON {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// Element-wise mean of equally sized vectors.
#[must_use]
pub fn centroid(vectors: &[Vec<f32>]) -> Vec<f32> {
    let Some(first) = vectors.first() else {
        return Vec::new();
    };
    let mut mean = vec![0.0; first.len()];
    for vector in vectors.iter().filter(|v| v.len() == first.len()) {
        for (acc, value) in mean.iter_mut().zip(vector) {
            *acc += value;
        }
    }
    let n = vectors.len() as f32;
    mean.iter_mut().for_each(|v| *v /= n);
    mean
}

/// Scales `vector` to unit length in place; zero vectors are left untouched.
pub fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        vector.iter_mut().for_each(|v| *v /= norm);
    }
}
