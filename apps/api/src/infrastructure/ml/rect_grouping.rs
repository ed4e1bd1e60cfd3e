//! Merging of raw sliding-window hits into face regions.
//!
//! Same rules as OpenCV's `groupRectangles`: hits are clustered by a
//! similarity predicate, clusters with `min_neighbors` or fewer members are
//! dropped, survivors are averaged, and weak clusters nested inside strong
//! ones are removed.

use serde::Serialize;

/// Relative tolerance used when deciding two hits describe the same face.
pub const GROUP_EPS: f64 = 0.2;

/// Axis-aligned region in input-image pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Maps a region found on a downscaled copy back to input pixels.
    pub fn upscaled(&self, factor: f64) -> Self {
        let up = |v: u32| (f64::from(v) * factor).round() as u32;
        Self::new(up(self.x), up(self.y), up(self.width), up(self.height))
    }
}

fn similar(a: &Region, b: &Region, eps: f64) -> bool {
    let delta = eps * f64::from(a.width.min(b.width) + a.height.min(b.height)) * 0.5;
    let close = |p: u32, q: u32| (f64::from(p) - f64::from(q)).abs() <= delta;
    close(a.x, b.x)
        && close(a.y, b.y)
        && close(a.x + a.width, b.x + b.width)
        && close(a.y + a.height, b.y + b.height)
}

struct DisjointSet {
    parent: Vec<usize>,
}

impl DisjointSet {
    fn new(len: usize) -> Self {
        Self {
            parent: (0..len).collect(),
        }
    }

    fn find(&mut self, mut i: usize) -> usize {
        while self.parent[i] != i {
            self.parent[i] = self.parent[self.parent[i]];
            i = self.parent[i];
        }
        i
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            self.parent[rb] = ra;
        }
    }
}

/// Groups raw hits. With `min_neighbors == 0` the hits are returned as-is.
pub fn group_regions(hits: &[Region], min_neighbors: u32, eps: f64) -> Vec<Region> {
    if min_neighbors == 0 || hits.is_empty() {
        return hits.to_vec();
    }

    let mut set = DisjointSet::new(hits.len());
    for i in 0..hits.len() {
        for j in (i + 1)..hits.len() {
            if similar(&hits[i], &hits[j], eps) {
                set.union(i, j);
            }
        }
    }

    // Per cluster: summed geometry and member count, in first-seen order.
    let mut roots: Vec<usize> = Vec::new();
    let mut totals: Vec<([u64; 4], u32)> = Vec::new();
    for (i, hit) in hits.iter().enumerate() {
        let root = set.find(i);
        let slot = match roots.iter().position(|&r| r == root) {
            Some(slot) => slot,
            None => {
                roots.push(root);
                totals.push(([0; 4], 0));
                roots.len() - 1
            }
        };
        let (sum, count) = &mut totals[slot];
        sum[0] += u64::from(hit.x);
        sum[1] += u64::from(hit.y);
        sum[2] += u64::from(hit.width);
        sum[3] += u64::from(hit.height);
        *count += 1;
    }

    let clusters: Vec<(Region, u32)> = totals
        .iter()
        .map(|(sum, count)| {
            let avg = |v: u64| (v as f64 / f64::from(*count)).round() as u32;
            (Region::new(avg(sum[0]), avg(sum[1]), avg(sum[2]), avg(sum[3])), *count)
        })
        .collect();

    clusters
        .iter()
        .enumerate()
        .filter(|(_, (_, n))| *n > min_neighbors)
        .filter(|(i, (r1, n1))| {
            !clusters.iter().enumerate().any(|(j, (r2, n2))| {
                if *i == j || *n2 <= min_neighbors {
                    return false;
                }
                let dx = (f64::from(r2.width) * eps).round() as i64;
                let dy = (f64::from(r2.height) * eps).round() as i64;
                let inside = i64::from(r1.x) >= i64::from(r2.x) - dx
                    && i64::from(r1.y) >= i64::from(r2.y) - dy
                    && i64::from(r1.x + r1.width) <= i64::from(r2.x + r2.width) + dx
                    && i64::from(r1.y + r1.height) <= i64::from(r2.y + r2.height) + dy;
                inside && (*n2 > (*n1).max(3) || *n1 < 3)
            })
        })
        .map(|(_, (region, _))| *region)
        .collect()
}
