//! Halo2 circuit for anonymous group signalling.
//!
//! Public inputs, one per row of the instance column:
//!
//! | row | value              |
//! |-----|--------------------|
//! | 0   | Merkle root        |
//! | 1   | nullifier hash     |
//! | 2   | signal hash        |
//! | 3   | external nullifier |
//!
//! Constraints:
//! 1. `commitment = H(nullifier_secret, trapdoor)`
//! 2. for each level, a boolean path bit selects the order of
//!    `(current, sibling)`, and `current = H(left, right)`
//! 3. the final `current` equals the root
//! 4. `H(external_nullifier, nullifier_secret)` equals the nullifier hash
//!
//! The signal hash is copied into the witness so the proof is bound to it;
//! no relation with the private inputs is needed.

use crate::identity::Identity;
use crate::merkle::MerkleProof;
use halo2_gadgets::poseidon::{
    primitives::{ConstantLength, P128Pow5T3},
    Hash as PoseidonHash, Pow5Chip, Pow5Config,
};
use halo2_proofs::{
    circuit::{AssignedCell, Layouter, SimpleFloorPlanner, Value},
    plonk::{Advice, Circuit, Column, ConstraintSystem, Error, Expression, Instance, Selector},
    poly::Rotation,
};
use pasta_curves::pallas;

pub const ROOT_ROW: usize = 0;
pub const NULLIFIER_HASH_ROW: usize = 1;
pub const SIGNAL_HASH_ROW: usize = 2;
pub const EXTERNAL_NULLIFIER_ROW: usize = 3;

type Cell = AssignedCell<pallas::Base, pallas::Base>;

#[derive(Debug, Clone)]
pub struct GreeterConfig {
    advice: [Column<Advice>; 5],
    instance: Column<Instance>,
    q_swap: Selector,
    poseidon: Pow5Config<pallas::Base, 3, 2>,
}

#[derive(Debug, Clone)]
pub struct GreeterCircuit {
    pub nullifier_secret: Value<pallas::Base>,
    pub trapdoor: Value<pallas::Base>,
    pub path_elements: Vec<Value<pallas::Base>>,
    /// Each entry is 0 or 1; anything else fails the boolean constraint.
    pub path_indices: Vec<Value<pallas::Base>>,
}

impl GreeterCircuit {
    /// Circuit shape for key generation: a tree of `depth`, no witnesses.
    #[must_use]
    pub fn blank(depth: usize) -> Self {
        Self {
            nullifier_secret: Value::unknown(),
            trapdoor: Value::unknown(),
            path_elements: vec![Value::unknown(); depth],
            path_indices: vec![Value::unknown(); depth],
        }
    }

    #[must_use]
    pub fn new(identity: &Identity, merkle_proof: &MerkleProof) -> Self {
        Self {
            nullifier_secret: Value::known(identity.nullifier_secret()),
            trapdoor: Value::known(identity.trapdoor()),
            path_elements: merkle_proof
                .path_elements
                .iter()
                .map(|e| Value::known(*e))
                .collect(),
            path_indices: merkle_proof
                .path_indices
                .iter()
                .map(|bit| Value::known(pallas::Base::from(u64::from(*bit))))
                .collect(),
        }
    }

    #[must_use]
    pub fn depth(&self) -> usize {
        self.path_elements.len()
    }
}

fn hash_pair(
    config: &GreeterConfig,
    mut layouter: impl Layouter<pallas::Base>,
    message: [Cell; 2],
) -> Result<Cell, Error> {
    let chip = Pow5Chip::construct(config.poseidon.clone());
    let hasher = PoseidonHash::<_, _, P128Pow5T3, ConstantLength<2>, 3, 2>::init(
        chip,
        layouter.namespace(|| "init"),
    )?;
    hasher.hash(layouter.namespace(|| "hash"), message)
}

impl Circuit<pallas::Base> for GreeterCircuit {
    type Config = GreeterConfig;
    type FloorPlanner = SimpleFloorPlanner;

    fn without_witnesses(&self) -> Self {
        Self::blank(self.depth())
    }

    fn configure(meta: &mut ConstraintSystem<pallas::Base>) -> Self::Config {
        let advice = [(); 5].map(|_| meta.advice_column());
        let instance = meta.instance_column();
        meta.enable_equality(instance);
        for column in &advice {
            meta.enable_equality(*column);
        }

        // advice: current | sibling | bit | left | right
        let q_swap = meta.selector();
        meta.create_gate("merkle swap", |meta| {
            let q = meta.query_selector(q_swap);
            let current = meta.query_advice(advice[0], Rotation::cur());
            let sibling = meta.query_advice(advice[1], Rotation::cur());
            let bit = meta.query_advice(advice[2], Rotation::cur());
            let left = meta.query_advice(advice[3], Rotation::cur());
            let right = meta.query_advice(advice[4], Rotation::cur());
            let one = Expression::Constant(pallas::Base::one());

            vec![
                q.clone() * bit.clone() * (one - bit.clone()),
                q.clone()
                    * (left - (current.clone() + bit.clone() * (sibling.clone() - current.clone()))),
                q * (right - (sibling.clone() + bit * (current - sibling))),
            ]
        });

        let partial_sbox = meta.advice_column();
        let rc_a = [(); 3].map(|_| meta.fixed_column());
        let rc_b = [(); 3].map(|_| meta.fixed_column());
        meta.enable_constant(rc_b[0]);
        let poseidon = Pow5Chip::<pallas::Base, 3, 2>::configure::<P128Pow5T3>(
            meta,
            [advice[0], advice[1], advice[2]],
            partial_sbox,
            rc_a,
            rc_b,
        );

        GreeterConfig {
            advice,
            instance,
            q_swap,
            poseidon,
        }
    }

    fn synthesize(
        &self,
        config: Self::Config,
        mut layouter: impl Layouter<pallas::Base>,
    ) -> Result<(), Error> {
        let (nullifier_secret, trapdoor, external_nullifier) = layouter.assign_region(
            || "load inputs",
            |mut region| {
                let nullifier_secret = region.assign_advice(
                    || "nullifier secret",
                    config.advice[0],
                    0,
                    || self.nullifier_secret,
                )?;
                let trapdoor =
                    region.assign_advice(|| "trapdoor", config.advice[1], 0, || self.trapdoor)?;
                region.assign_advice_from_instance(
                    || "signal hash",
                    config.instance,
                    SIGNAL_HASH_ROW,
                    config.advice[2],
                    0,
                )?;
                let external_nullifier = region.assign_advice_from_instance(
                    || "external nullifier",
                    config.instance,
                    EXTERNAL_NULLIFIER_ROW,
                    config.advice[3],
                    0,
                )?;
                Ok((nullifier_secret, trapdoor, external_nullifier))
            },
        )?;

        let mut current = hash_pair(
            &config,
            layouter.namespace(|| "identity commitment"),
            [nullifier_secret.clone(), trapdoor],
        )?;

        for (level, (sibling, bit)) in self
            .path_elements
            .iter()
            .zip(&self.path_indices)
            .enumerate()
        {
            let (left, right) = layouter.assign_region(
                || format!("merkle swap {level}"),
                |mut region| {
                    config.q_swap.enable(&mut region, 0)?;

                    let current_cell =
                        current.copy_advice(|| "current", &mut region, config.advice[0], 0)?;
                    region.assign_advice(|| "sibling", config.advice[1], 0, || *sibling)?;
                    region.assign_advice(|| "path bit", config.advice[2], 0, || *bit)?;

                    let inputs = current_cell.value().copied().zip(*sibling).zip(*bit);
                    let left = region.assign_advice(
                        || "left",
                        config.advice[3],
                        0,
                        || inputs.map(|((c, s), b)| c + b * (s - c)),
                    )?;
                    let right = region.assign_advice(
                        || "right",
                        config.advice[4],
                        0,
                        || inputs.map(|((c, s), b)| s + b * (c - s)),
                    )?;
                    Ok((left, right))
                },
            )?;

            current = hash_pair(
                &config,
                layouter.namespace(|| format!("merkle level {level}")),
                [left, right],
            )?;
        }

        layouter.constrain_instance(current.cell(), config.instance, ROOT_ROW)?;

        let nullifier_hash = hash_pair(
            &config,
            layouter.namespace(|| "nullifier hash"),
            [external_nullifier, nullifier_secret],
        )?;
        layouter.constrain_instance(nullifier_hash.cell(), config.instance, NULLIFIER_HASH_ROW)?;

        Ok(())
    }
}
