use crate::ParamGroups;
use std::collections::BTreeMap;

/// Plain gradient descent over named parameter groups.
///
/// Each group can be given its own learning rate; groups without one use the default.
#[derive(Debug, Clone, PartialEq)]
pub struct Sgd {
    learning_rate: f64,
    group_rates: BTreeMap<&'static str, f64>,
}

impl Sgd {
    pub fn new(learning_rate: f64) -> Self {
        Self {
            learning_rate,
            group_rates: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_group_rate(mut self, group: &'static str, learning_rate: f64) -> Self {
        self.group_rates.insert(group, learning_rate);
        self
    }

    pub fn learning_rate(&self, group: &str) -> f64 {
        self.group_rates
            .get(group)
            .copied()
            .unwrap_or(self.learning_rate)
    }

    /// Applies `value -= rate * grad` to every parameter of every group.
    pub fn step(&self, groups: &mut ParamGroups<'_>) {
        for (&name, params) in groups.iter_mut() {
            let rate = self.learning_rate(name);
            for param in params.iter_mut() {
                for (value, grad) in param.value.iter_mut().zip(&param.grad) {
                    *value -= grad * rate;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Device, Parameter};
    use camopt_core::nalgebra::Vector3;

    #[test]
    fn per_group_rates() {
        let mut a = Parameter::zeros(1, Device::Cpu);
        let mut b = Parameter::zeros(1, Device::Cpu);
        a.grad[0] = Vector3::new(1.0, 0.0, 0.0);
        b.grad[0] = Vector3::new(0.0, 1.0, 0.0);
        let sgd = Sgd::new(0.1).with_group_rate("b", 0.5);
        {
            let mut groups = ParamGroups::new();
            groups.insert("a", vec![&mut a]);
            groups.insert("b", vec![&mut b]);
            sgd.step(&mut groups);
        }
        assert_eq!(a.value[0], Vector3::new(-0.1, 0.0, 0.0));
        assert_eq!(b.value[0], Vector3::new(0.0, -0.5, 0.0));
    }
}
