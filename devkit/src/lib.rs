/*!
# Gridwatch DevKit - Utilitaires de test

Bibliothèque facilitant les tests du kernel sans vrais serveurs de jeu :
- `FakeGrid` : faux serveur TCP + UDP parlant A2S
- `closed_port` : port local sans écoute, pour les grids morts
*/

pub mod fake_grid;

pub use fake_grid::{closed_port, Behaviour, FakeGrid, FakeGridSpec, FakePlayer};
