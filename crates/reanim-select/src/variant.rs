//! Variants - alternative motions of one candidate

use std::sync::atomic::{AtomicUsize, Ordering};

use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use reanim_core::{bool_field_or, f32_field, MotionId, ReanimError, ReanimResult};
use reanim_rules::MAX_WEIGHT;

/// How the concrete motion is picked among variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum VariantMode {
    /// Weighted random
    #[default]
    Random,
    /// Round robin in authored order
    Sequential,
}

/// One alternative motion
#[derive(Debug, Clone, PartialEq)]
pub struct Variant {
    pub name: String,
    /// Index inside the owning pack
    pub local: u32,
    /// Engine-wide motion id
    pub motion: MotionId,
    pub weight: f32,
    pub disabled: bool,
}

impl Variant {
    pub fn new(name: impl Into<String>, local: u32, motion: MotionId) -> Self {
        Variant {
            name: name.into(),
            local,
            motion,
            weight: 1.0,
            disabled: false,
        }
    }

    pub fn with_weight(mut self, weight: f32) -> Self {
        self.weight = weight;
        self
    }

    pub fn serialize(&self) -> Value {
        let mut value = json!({
            "name": self.name,
            "motion": self.local,
            "weight": self.weight,
        });
        if self.disabled {
            value["disabled"] = Value::Bool(true);
        }
        value
    }

    /// Parse one variant; `base` is the pack's motion offset
    pub fn parse(input: &Value, base: u32) -> ReanimResult<Self> {
        let local = input
            .get("motion")
            .and_then(Value::as_u64)
            .ok_or_else(|| ReanimError::missing("motion"))?;
        let local = u32::try_from(local).map_err(|_| ReanimError::mismatch("motion", "u32"))?;
        let name = input
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let weight = match input.get("weight") {
            Some(_) => f32_field(input, "weight")?,
            None => 1.0,
        };
        if !(0.0..=MAX_WEIGHT).contains(&weight) {
            return Err(ReanimError::invalid("weight", weight.to_string()));
        }
        Ok(Variant {
            name,
            local,
            motion: MotionId::from_offset(base, local)?,
            weight,
            disabled: bool_field_or(input, "disabled", false)?,
        })
    }
}

/// Variants of a candidate plus the pick state
#[derive(Debug, Default)]
pub struct VariantSet {
    mode: VariantMode,
    variants: Vec<Variant>,
    cursor: AtomicUsize,
}

impl VariantSet {
    pub fn new(mode: VariantMode, variants: Vec<Variant>) -> Self {
        VariantSet {
            mode,
            variants,
            cursor: AtomicUsize::new(0),
        }
    }

    pub fn mode(&self) -> VariantMode {
        self.mode
    }

    pub fn variants(&self) -> &[Variant] {
        &self.variants
    }

    pub fn is_empty(&self) -> bool {
        self.variants.is_empty()
    }

    pub fn len(&self) -> usize {
        self.variants.len()
    }

    /// Pick an enabled variant; `None` when none is enabled
    pub fn choose(&self, rng: Option<&mut (dyn RngCore + '_)>) -> Option<usize> {
        let enabled: Vec<usize> = self
            .variants
            .iter()
            .enumerate()
            .filter(|(_, v)| !v.disabled)
            .map(|(i, _)| i)
            .collect();
        if enabled.is_empty() {
            return None;
        }

        match self.mode {
            VariantMode::Sequential => {
                let step = self.cursor.fetch_add(1, Ordering::Relaxed);
                Some(enabled[step % enabled.len()])
            }
            VariantMode::Random => {
                let weight = |i: usize| f64::from(self.variants[i].weight).max(0.0);
                let total: f64 = enabled.iter().map(|&i| weight(i)).sum();
                let Some(rng) = rng else {
                    return Some(enabled[0]);
                };
                if !(total.is_finite() && total > 0.0) {
                    return Some(enabled[rng.gen_range(0..enabled.len())]);
                }
                let mut roll = rng.gen_range(0.0..total);
                for &i in &enabled {
                    let weight = weight(i);
                    if roll < weight {
                        return Some(i);
                    }
                    roll -= weight;
                }
                enabled.last().copied()
            }
        }
    }

    pub fn get(&self, index: usize) -> Option<&Variant> {
        self.variants.get(index)
    }

    pub fn serialize(&self) -> Value {
        json!({
            "mode": self.mode,
            "variants": self.variants.iter().map(Variant::serialize).collect::<Vec<_>>(),
        })
    }

    pub fn parse(input: &Value, base: u32) -> ReanimResult<Self> {
        let mode = match input.get("mode") {
            Some(v) => serde_json::from_value(v.clone())
                .map_err(|e| ReanimError::invalid("mode", e.to_string()))?,
            None => VariantMode::Random,
        };
        let variants = input
            .get("variants")
            .and_then(Value::as_array)
            .ok_or_else(|| ReanimError::mismatch("variants", "array"))?
            .iter()
            .map(|v| Variant::parse(v, base))
            .collect::<ReanimResult<Vec<_>>>()?;
        Ok(VariantSet::new(mode, variants))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn three() -> Vec<Variant> {
        (0..3)
            .map(|i| Variant::new(format!("v{}", i), i, MotionId::new(100 + i)))
            .collect()
    }

    #[test]
    fn test_sequential_skips_disabled() {
        let mut variants = three();
        variants[1].disabled = true;
        let set = VariantSet::new(VariantMode::Sequential, variants);

        let picks: Vec<_> = (0..4).map(|_| set.choose(None).unwrap()).collect();
        assert_eq!(picks, vec![0, 2, 0, 2]);
    }

    #[test]
    fn test_random_respects_zero_weight() {
        let mut variants = three();
        variants[0].weight = 0.0;
        variants[2].weight = 0.0;
        let set = VariantSet::new(VariantMode::Random, variants);

        let mut rng = StdRng::seed_from_u64(99);
        for _ in 0..50 {
            assert_eq!(set.choose(Some(&mut rng as &mut dyn RngCore)), Some(1));
        }
    }

    #[test]
    fn test_random_huge_weights_pick() {
        let mut variants = three();
        variants.iter_mut().for_each(|v| v.weight = f32::MAX);
        let set = VariantSet::new(VariantMode::Random, variants);

        let mut rng = StdRng::seed_from_u64(4);
        for _ in 0..20 {
            assert!(set.choose(Some(&mut rng as &mut dyn RngCore)).is_some());
        }
    }

    #[test]
    fn test_parse_rejects_out_of_range_fields() {
        let wide = json!({"variants": [{"motion": 4294967297u64}]});
        assert!(VariantSet::parse(&wide, 0).is_err());
        let past_end = json!({"variants": [{"motion": 4294967295u64}]});
        assert!(VariantSet::parse(&past_end, 1000).is_err());
        let heavy = json!({"variants": [{"motion": 0, "weight": 3.0e38}]});
        assert!(VariantSet::parse(&heavy, 0).is_err());
    }

    #[test]
    fn test_all_disabled() {
        let mut variants = three();
        variants.iter_mut().for_each(|v| v.disabled = true);
        let set = VariantSet::new(VariantMode::Random, variants);
        assert_eq!(set.choose(None), None);
    }

    #[test]
    fn test_parse_applies_base() {
        let input = json!({"mode": "sequential", "variants": [{"motion": 3, "weight": 2.0}]});
        let set = VariantSet::parse(&input, 1000).unwrap();
        assert_eq!(set.mode(), VariantMode::Sequential);
        assert_eq!(set.variants()[0].motion, MotionId::new(1003));
        assert_eq!(VariantSet::parse(&set.serialize(), 1000).unwrap().variants(), set.variants());
    }
}
