//! Neighbor merging of raw sliding-window hits.
//!
//! Follows OpenCV's `groupRectangles`: hits are clustered by a similarity
//! predicate, clusters with too few members are dropped, each surviving
//! cluster is averaged, and a weak cluster nested inside a stronger one is
//! suppressed.

use crate::detect::result::Detection;

/// Relative tolerance used when deciding that two hits are the same object.
pub const GROUP_EPS: f64 = 0.2;

#[derive(Clone, Copy, Debug)]
struct Rect {
    x: i64,
    y: i64,
    w: i64,
    h: i64,
}

impl From<&Detection> for Rect {
    fn from(d: &Detection) -> Self {
        Rect {
            x: d.x as i64,
            y: d.y as i64,
            w: d.width as i64,
            h: d.height as i64,
        }
    }
}

fn similar(a: &Rect, b: &Rect, eps: f64) -> bool {
    let delta = eps * (a.w.min(b.w) + a.h.min(b.h)) as f64 * 0.5;
    (a.x - b.x).abs() as f64 <= delta
        && (a.y - b.y).abs() as f64 <= delta
        && (a.x + a.w - b.x - b.w).abs() as f64 <= delta
        && (a.y + a.h - b.y - b.h).abs() as f64 <= delta
}

/// Union-find over hit indices; returns a dense class label per hit, labels
/// numbered in order of first appearance.
fn partition(rects: &[Rect], eps: f64) -> (Vec<usize>, usize) {
    let mut parent: Vec<usize> = (0..rects.len()).collect();

    fn find(parent: &mut [usize], mut i: usize) -> usize {
        while parent[i] != i {
            parent[i] = parent[parent[i]];
            i = parent[i];
        }
        i
    }

    for i in 0..rects.len() {
        for j in (i + 1)..rects.len() {
            if similar(&rects[i], &rects[j], eps) {
                let (ri, rj) = (find(&mut parent, i), find(&mut parent, j));
                if ri != rj {
                    parent[rj] = ri;
                }
            }
        }
    }

    let mut label_of_root = vec![usize::MAX; rects.len()];
    let mut labels = Vec::with_capacity(rects.len());
    let mut classes = 0;
    for i in 0..rects.len() {
        let root = find(&mut parent, i);
        if label_of_root[root] == usize::MAX {
            label_of_root[root] = classes;
            classes += 1;
        }
        labels.push(label_of_root[root]);
    }
    (labels, classes)
}

/// Merge raw hits into detections. A merged box survives only when more than
/// `min_neighbors` raw hits support it. `min_neighbors == 0` returns the raw
/// hits untouched.
pub fn group_rectangles(hits: &[Detection], min_neighbors: u32, eps: f64) -> Vec<Detection> {
    if min_neighbors == 0 || hits.is_empty() {
        return hits.to_vec();
    }
    let rects: Vec<Rect> = hits.iter().map(Rect::from).collect();
    let (labels, classes) = partition(&rects, eps);

    let mut totals = vec![(0i64, 0i64, 0i64, 0i64); classes];
    let mut counts = vec![0i64; classes];
    for (rect, &label) in rects.iter().zip(&labels) {
        let t = &mut totals[label];
        t.0 += rect.x;
        t.1 += rect.y;
        t.2 += rect.w;
        t.3 += rect.h;
        counts[label] += 1;
    }

    let merged: Vec<Rect> = totals
        .iter()
        .zip(&counts)
        .map(|(t, &n)| {
            let s = 1.0 / n as f64;
            Rect {
                x: (t.0 as f64 * s).round() as i64,
                y: (t.1 as f64 * s).round() as i64,
                w: (t.2 as f64 * s).round() as i64,
                h: (t.3 as f64 * s).round() as i64,
            }
        })
        .collect();

    let threshold = min_neighbors as i64;
    let mut out = Vec::new();
    for (i, r1) in merged.iter().enumerate() {
        let n1 = counts[i];
        if n1 <= threshold {
            continue;
        }
        let nested = merged.iter().enumerate().any(|(j, r2)| {
            let n2 = counts[j];
            if j == i || n2 <= threshold {
                return false;
            }
            let dx = (r2.w as f64 * eps).round() as i64;
            let dy = (r2.h as f64 * eps).round() as i64;
            r1.x >= r2.x - dx
                && r1.y >= r2.y - dy
                && r1.x + r1.w <= r2.x + r2.w + dx
                && r1.y + r1.h <= r2.y + r2.h + dy
                && (n2 > n1.max(3) || n1 < 3)
        });
        if !nested {
            out.push(Detection::new(
                r1.x.max(0) as u32,
                r1.y.max(0) as u32,
                r1.w as u32,
                r1.h as u32,
            ));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jittered(x: u32, y: u32, size: u32, n: u32) -> Vec<Detection> {
        (0..n)
            .map(|i| Detection::new(x + i % 2, y + (i / 2) % 2, size, size))
            .collect()
    }

    #[test]
    fn cluster_needs_more_than_min_neighbors_hits() {
        assert!(group_rectangles(&jittered(10, 10, 40, 6), 6, GROUP_EPS).is_empty());
        let merged = group_rectangles(&jittered(10, 10, 40, 7), 6, GROUP_EPS);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].width, 40);
    }

    #[test]
    fn distant_clusters_stay_separate() {
        let mut hits = jittered(10, 10, 40, 8);
        hits.extend(jittered(300, 120, 40, 8));
        let merged = group_rectangles(&hits, 6, GROUP_EPS);
        assert_eq!(merged.len(), 2);
        assert!(merged.iter().any(|d| d.x >= 300));
    }

    #[test]
    fn weak_cluster_inside_strong_cluster_is_suppressed() {
        let mut hits = jittered(100, 100, 80, 20);
        hits.extend(jittered(120, 120, 30, 8));
        let merged = group_rectangles(&hits, 6, GROUP_EPS);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].width, 80);
    }

    #[test]
    fn zero_neighbors_returns_raw_hits() {
        let hits = jittered(0, 0, 20, 3);
        assert_eq!(group_rectangles(&hits, 0, GROUP_EPS), hits);
    }
}
