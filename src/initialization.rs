use std::fmt::Display;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Initialization {
    ///-1 to 1
    Random,
    /// Glorot uniform, limit `sqrt(6/(inputs+outputs))`
    Xavier,
    /// He uniform, limit `sqrt(6/inputs)`, suits relu layers
    He,
    Fixed(f32),
}

pub fn calc_initialization(typ: Initialization, inputs: usize, outputs: usize) -> f32 {
    let uniform = || fastrand::f32() * 2. - 1.;
    match typ {
        Initialization::Random => uniform(),
        Initialization::Xavier => uniform() * (6. / (inputs + outputs) as f32).sqrt(),
        Initialization::He => uniform() * (6. / inputs as f32).sqrt(),
        Initialization::Fixed(val) => val,
    }
}

impl Display for Initialization {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Initialization::Random => write!(f, "Random"),
            Initialization::Xavier => write!(f, "Xavier"),
            Initialization::He => write!(f, "He"),
            Initialization::Fixed(v) => write!(f, "Fixed({v})"),
        }
    }
}
