use crate::models::EMBEDDING_DIM;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PcaError {
    #[error("at least 2 vectors are required, got {got}")]
    InsufficientSamples { got: usize },
    #[error("vector {index} has length {len}, expected {expected}")]
    DimensionMismatch {
        index: usize,
        len: usize,
        expected: usize,
    },
}

const MAX_ITERATIONS: usize = 500;
const CONVERGENCE_TOL: f64 = 1e-12;

/// Dominant principal component of a set of embedding vectors.
///
/// Mean-centers the N×1024 sample matrix, forms the 1024×1024 covariance
/// matrix (divided by N−1), and extracts the eigenvector of the largest
/// eigenvalue by power iteration; the covariance matrix is symmetric
/// positive semi-definite, so the iteration converges to the dominant
/// eigenvector from any starting vector not orthogonal to it. The result
/// is L2-normalized and deterministic up to sign.
pub fn principal_component(vectors: &[Vec<f64>]) -> Result<Vec<f64>, PcaError> {
    let n = vectors.len();
    if n < 2 {
        return Err(PcaError::InsufficientSamples { got: n });
    }
    for (index, v) in vectors.iter().enumerate() {
        if v.len() != EMBEDDING_DIM {
            return Err(PcaError::DimensionMismatch {
                index,
                len: v.len(),
                expected: EMBEDDING_DIM,
            });
        }
    }

    let d = EMBEDDING_DIM;

    // Column means
    let mut mean = vec![0.0f64; d];
    for v in vectors {
        for j in 0..d {
            mean[j] += v[j];
        }
    }
    for m in mean.iter_mut() {
        *m /= n as f64;
    }

    // Centered samples
    let centered: Vec<Vec<f64>> = vectors
        .iter()
        .map(|v| v.iter().zip(&mean).map(|(x, m)| x - m).collect())
        .collect();

    // Covariance, d×d row-major, divided by N−1
    let mut cov = vec![0.0f64; d * d];
    for row in &centered {
        for j in 0..d {
            let rj = row[j];
            if rj == 0.0 {
                continue;
            }
            let base = j * d;
            for k in 0..d {
                cov[base + k] += rj * row[k];
            }
        }
    }
    let scale = 1.0 / (n as f64 - 1.0);
    for c in cov.iter_mut() {
        *c *= scale;
    }

    // Deterministic start: the axis with the largest variance.
    let mut start_axis = 0;
    let mut best_var = f64::MIN;
    for j in 0..d {
        let var = cov[j * d + j];
        if var > best_var {
            best_var = var;
            start_axis = j;
        }
    }

    let mut v = vec![0.0f64; d];
    v[start_axis] = 1.0;

    // Degenerate sample set (all rows identical): no principal direction
    // exists; the start axis is as good an answer as any eigenvector of
    // the zero matrix.
    if best_var <= 0.0 {
        return Ok(v);
    }

    for _ in 0..MAX_ITERATIONS {
        let next = mat_vec(&cov, &v, d);
        let norm = l2_norm(&next);
        if norm == 0.0 {
            // Start vector fell in the null space; restart off-axis.
            v = vec![1.0 / (d as f64).sqrt(); d];
            continue;
        }
        let next: Vec<f64> = next.iter().map(|x| x / norm).collect();
        let alignment: f64 = next.iter().zip(&v).map(|(a, b)| a * b).sum();
        v = next;
        if (1.0 - alignment.abs()) < CONVERGENCE_TOL {
            break;
        }
    }

    let norm = l2_norm(&v);
    Ok(v.iter().map(|x| x / norm).collect())
}

fn mat_vec(m: &[f64], v: &[f64], d: usize) -> Vec<f64> {
    let mut out = vec![0.0f64; d];
    for (j, o) in out.iter_mut().enumerate() {
        let row = &m[j * d..(j + 1) * d];
        let mut acc = 0.0;
        for k in 0..d {
            acc += row[k] * v[k];
        }
        *o = acc;
    }
    out
}

fn l2_norm(v: &[f64]) -> f64 {
    v.iter().map(|x| x * x).sum::<f64>().sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::cosine::cosine;

    /// Samples spread along `direction` with small off-axis noise.
    fn samples_along(direction: &[f64], n: usize) -> Vec<Vec<f64>> {
        let norm = l2_norm(direction);
        let unit: Vec<f64> = direction.iter().map(|x| x / norm).collect();
        (0..n)
            .map(|i| {
                let major = (i as f64 + 1.0) * 3.0;
                let minor = 0.01 * (i as f64 - n as f64 / 2.0);
                let mut v: Vec<f64> = unit.iter().map(|u| u * major).collect();
                // Noise on an axis mostly orthogonal to the direction
                v[(i * 7) % EMBEDDING_DIM] += minor;
                v
            })
            .collect()
    }

    fn axis(j: usize) -> Vec<f64> {
        let mut v = vec![0.0; EMBEDDING_DIM];
        v[j] = 1.0;
        v
    }

    #[test]
    fn test_rejects_fewer_than_two_samples() {
        assert_eq!(
            principal_component(&[]),
            Err(PcaError::InsufficientSamples { got: 0 })
        );
        assert_eq!(
            principal_component(&[vec![0.0; EMBEDDING_DIM]]),
            Err(PcaError::InsufficientSamples { got: 1 })
        );
    }

    #[test]
    fn test_rejects_wrong_dimensionality() {
        let good = vec![0.0; EMBEDDING_DIM];
        let bad = vec![0.0; 512];
        assert_eq!(
            principal_component(&[good, bad]),
            Err(PcaError::DimensionMismatch {
                index: 1,
                len: 512,
                expected: EMBEDDING_DIM,
            })
        );
    }

    #[test]
    fn test_component_has_unit_norm() {
        let data = samples_along(&axis(3), 10);
        let pc = principal_component(&data).unwrap();
        assert_eq!(pc.len(), EMBEDDING_DIM);
        assert!((l2_norm(&pc) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_recovers_dominant_direction_up_to_sign() {
        let direction = axis(42);
        let data = samples_along(&direction, 20);
        let pc = principal_component(&data).unwrap();
        // Sign-invariant comparison against the known direction
        let sim = cosine(&pc, &direction).unwrap();
        assert!(sim.abs() > 0.999, "|cos| was {}", sim.abs());
    }

    #[test]
    fn test_deterministic_across_runs_up_to_sign() {
        let mut direction = vec![0.0; EMBEDDING_DIM];
        for (j, x) in direction.iter_mut().enumerate() {
            *x = ((j % 13) as f64) - 6.0;
        }
        let data = samples_along(&direction, 8);
        let first = principal_component(&data).unwrap();
        let second = principal_component(&data).unwrap();
        let sim = cosine(&first, &second).unwrap();
        assert!(sim.abs() > 1.0 - 1e-9);
    }

    #[test]
    fn test_identical_rows_degenerate_but_unit_norm() {
        let row = vec![1.0; EMBEDDING_DIM];
        let data = vec![row.clone(), row.clone(), row];
        let pc = principal_component(&data).unwrap();
        assert!((l2_norm(&pc) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_two_cluster_direction() {
        // Two clusters split along axis 5: the principal component must
        // align with the separation axis, not the noise axes.
        let mut data = Vec::new();
        for i in 0..6 {
            let mut v = vec![0.0; EMBEDDING_DIM];
            v[5] = if i % 2 == 0 { 10.0 } else { -10.0 };
            v[100 + i] = 0.05;
            data.push(v);
        }
        let pc = principal_component(&data).unwrap();
        let sim = cosine(&pc, &axis(5)).unwrap();
        assert!(sim.abs() > 0.999);
    }
}
