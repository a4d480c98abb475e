//! # Gridwatch kernel
//!
//! Surveillance d'un ensemble de serveurs de jeu ("grids") indépendants :
//! joignabilité TCP (`status`) et roster via requêtes A2S (`roster`), avec
//! un fan-out par requête HTTP et une isolation stricte des fautes par grid.
//!
//! Le registre des grids est chargé une fois au démarrage (`config` +
//! `registry`) puis partagé en lecture seule.

pub mod config;
pub mod health;
pub mod http;
pub mod probe;
pub mod query;
pub mod registry;
pub mod roster;
pub mod status;
