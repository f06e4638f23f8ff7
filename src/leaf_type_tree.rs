// SPDX-License-Identifier: Apache-2.0

//! A value of type `T` attached to every bits-typed leaf of an IR type.
//!
//! Leaves are stored flat in element order (the order of
//! `Type::leaf_types`), so a tuple element corresponds to a contiguous range
//! of leaves.

use crate::ir::Type;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafTypeTree<T> {
    ty: Type,
    elements: Vec<T>,
}

impl<T: Clone> LeafTypeTree<T> {
    /// Every leaf holds a copy of `value`.
    pub fn new(ty: Type, value: T) -> Self {
        let n = ty.leaf_types().len();
        LeafTypeTree {
            ty,
            elements: vec![value; n],
        }
    }
}

impl<T> LeafTypeTree<T> {
    /// Builds each leaf from its bits type.
    pub fn from_fn(ty: Type, mut f: impl FnMut(&Type) -> T) -> Self {
        let elements = ty.leaf_types().iter().map(|leaf| f(leaf)).collect();
        LeafTypeTree { ty, elements }
    }

    pub fn from_elements(ty: Type, elements: Vec<T>) -> Self {
        assert_eq!(
            ty.leaf_types().len(),
            elements.len(),
            "leaf count mismatch for type {}",
            ty
        );
        LeafTypeTree { ty, elements }
    }

    /// Assembles a tuple-typed tree from one subtree per element.
    pub fn from_subtrees(subtrees: Vec<LeafTypeTree<T>>) -> Self {
        let mut types = Vec::with_capacity(subtrees.len());
        let mut elements = Vec::new();
        for subtree in subtrees {
            types.push(Box::new(subtree.ty));
            elements.extend(subtree.elements);
        }
        LeafTypeTree {
            ty: Type::Tuple(types),
            elements,
        }
    }

    pub fn ty(&self) -> &Type {
        &self.ty
    }

    pub fn elements(&self) -> &[T] {
        &self.elements
    }

    pub fn into_elements(self) -> Vec<T> {
        self.elements
    }

    pub fn leaf_count(&self) -> usize {
        self.elements.len()
    }

    pub fn get_leaf(&self, index: usize) -> &T {
        &self.elements[index]
    }

    pub fn get_leaf_mut(&mut self, index: usize) -> &mut T {
        &mut self.elements[index]
    }

    /// The single leaf of a bits-typed tree.
    pub fn get_bits_leaf(&self) -> Option<&T> {
        if self.ty.is_bits() {
            self.elements.first()
        } else {
            None
        }
    }

    pub fn map<U>(&self, f: impl FnMut(&T) -> U) -> LeafTypeTree<U> {
        LeafTypeTree {
            ty: self.ty.clone(),
            elements: self.elements.iter().map(f).collect(),
        }
    }

    pub fn zip<U, V>(&self, other: &LeafTypeTree<U>, mut f: impl FnMut(&T, &U) -> V) -> LeafTypeTree<V> {
        assert_eq!(self.ty, other.ty, "leaf type tree shapes differ");
        LeafTypeTree {
            ty: self.ty.clone(),
            elements: self
                .elements
                .iter()
                .zip(other.elements.iter())
                .map(|(a, b)| f(a, b))
                .collect(),
        }
    }
}

impl<T: Clone> LeafTypeTree<T> {
    /// The subtree for tuple element `index`, or `None` if this is not a
    /// tuple with that many elements.
    pub fn tuple_element(&self, index: usize) -> Option<LeafTypeTree<T>> {
        let Type::Tuple(types) = &self.ty else {
            return None;
        };
        let element_ty = types.get(index)?;
        let start: usize = types[..index].iter().map(|t| t.leaf_types().len()).sum();
        let count = element_ty.leaf_types().len();
        Some(LeafTypeTree {
            ty: element_ty.as_ref().clone(),
            elements: self.elements[start..start + count].to_vec(),
        })
    }

    /// Splits a tuple-typed tree into one subtree per element.
    pub fn tuple_elements(&self) -> Option<Vec<LeafTypeTree<T>>> {
        let Type::Tuple(types) = &self.ty else {
            return None;
        };
        (0..types.len()).map(|i| self.tuple_element(i)).collect()
    }
}
