use crate::core::models::atom::Element;
use phf::{Map, phf_map};
use std::f64::consts::PI;

/// Smallest B-factor (Å²) used when rendering atomic density.
pub const MIN_B_FACTOR: f64 = 1.0;

/// Cromer-Mann coefficients: `f(s) = Σ a_i exp(-b_i s²) + c`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScatteringFactors {
    pub a: [f64; 4],
    pub b: [f64; 4],
    pub c: f64,
}

#[rustfmt::skip]
static CROMER_MANN: Map<&'static str, ScatteringFactors> = phf_map! {
    "H"  => ScatteringFactors { a: [0.489918, 0.262003, 0.196767, 0.049879], b: [20.6593, 7.74039, 49.5519, 2.20159], c: 0.001305 },
    "C"  => ScatteringFactors { a: [2.31, 1.02, 1.5886, 0.865],              b: [20.8439, 10.2075, 0.5687, 51.6512],  c: 0.2156 },
    "N"  => ScatteringFactors { a: [12.2126, 3.1322, 2.0125, 1.1663],        b: [0.0057, 9.8933, 28.9975, 0.5826],    c: -11.529 },
    "O"  => ScatteringFactors { a: [3.0485, 2.2868, 1.5463, 0.867],          b: [13.2771, 5.7011, 0.3239, 32.9089],   c: 0.2508 },
    "P"  => ScatteringFactors { a: [6.4345, 4.1791, 1.78, 1.4908],           b: [1.9067, 27.157, 0.526, 68.1645],     c: 1.1149 },
    "S"  => ScatteringFactors { a: [6.9053, 5.2034, 1.4379, 1.5863],         b: [1.4679, 22.2151, 0.2536, 56.172],    c: 0.8669 },
    "SE" => ScatteringFactors { a: [17.0006, 5.8196, 3.9731, 4.3543],        b: [2.4098, 0.2726, 15.2372, 43.8163],   c: 2.8409 },
};

impl ScatteringFactors {
    /// Coefficients for an element; unknown elements are treated as carbon.
    pub fn for_element(element: Element) -> &'static ScatteringFactors {
        CROMER_MANN
            .get(element.symbol())
            .or_else(|| CROMER_MANN.get("C"))
            .unwrap_or(&CARBON)
    }

    /// Forward scattering `f(0)`, the sum of all coefficients; close to the electron count.
    pub fn weight(&self) -> f64 {
        self.a.iter().sum::<f64>() + self.c
    }

    /// Real-space density at squared distance `r2` from an atom with isotropic B-factor `b`.
    ///
    /// Each Gaussian term is broadened by `B`; the constant term is treated as a Gaussian with
    /// zero width before broadening.
    pub fn density(&self, r2: f64, b_factor: f64) -> f64 {
        let bf = b_factor.max(MIN_B_FACTOR);
        let gaussian = |amplitude: f64, width: f64| {
            let bw = width + bf;
            amplitude * (4.0 * PI / bw).powf(1.5) * (-4.0 * PI * PI * r2 / bw).exp()
        };
        let mut total = gaussian(self.c, 0.0);
        for (a, b) in self.a.iter().zip(self.b.iter()) {
            total += gaussian(*a, *b);
        }
        total
    }
}

const CARBON: ScatteringFactors = ScatteringFactors {
    a: [2.31, 1.02, 1.5886, 0.865],
    b: [20.8439, 10.2075, 0.5687, 51.6512],
    c: 0.2156,
};
